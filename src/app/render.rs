//! TUI描画関連の関数。

use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, Wrap},
};

use crate::{
    checklist::status_marker,
    events::Screen,
    format::{
        country_flag, format_currency, format_grouped, format_number, hex_to_rgb, platform_color,
        tracks_noun,
    },
    input, layout,
    reports::{Report, ReportDetails, ReportStatus, top_by_revenue},
    shortcuts::Shortcuts,
    upload::{Outcome, Submission, UploadFlow},
};

use super::App;

/// 詳細画面のプラットフォーム・国の表示件数。
const TOP_ROWS: usize = 6;

/// 画面全体のレイアウトを描画する。
pub fn draw(f: &mut Frame, app: &App) {
    // ウィザード画面は専用描画で処理する。
    if app.ui.screen == Screen::InitialSetup {
        draw_wizard_screen(f, app);
        if let Some(input_state) = &app.input_box {
            input::render_input_box(f, input_state);
        }
        return;
    }

    // メインレイアウト（Body + HELP + STATUS）を作る。
    let main_layout = layout::create_main_layout(f.area());
    let body_layout = layout::create_body_layout(main_layout.body);

    draw_reports_table(f, app, body_layout.reports_table);

    let info_panel = Paragraph::new(build_info_text(app))
        .block(Block::default().borders(Borders::ALL).title("INFO"))
        .wrap(Wrap { trim: true });
    f.render_widget(info_panel, body_layout.info_panel);

    // HELPバー（画面ごとのショートカット）を描画する。
    let help_bar = Paragraph::new(get_help_text(&app.ui.screen, &app.shortcuts))
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    f.render_widget(build_status_bar(app), main_layout.status_bar);

    // 一覧の上に重ねる画面。
    match app.ui.screen {
        Screen::Upload => draw_upload_popup(f, app),
        Screen::ReportDetail => draw_detail_screen(f, app, main_layout.body),
        Screen::ConfirmDelete => draw_confirm_delete(f, app),
        _ => {}
    }

    // 入力ボックスが開いていれば重ねて描画する。
    if let Some(input_state) = &app.input_box {
        input::render_input_box(f, input_state);
    }
}

/// レポート一覧テーブルを描画する。
fn draw_reports_table(f: &mut Frame, app: &App, area: Rect) {
    let rows = app.reports.iter().enumerate().map(|(i, r)| {
        let style = match r.status {
            ReportStatus::Failed => Style::default().fg(Color::Red),
            ReportStatus::Processing => Style::default().fg(Color::Yellow),
            ReportStatus::Completed => Style::default(),
        };
        Row::new(vec![
            format!("{}", i + 1),
            r.display_name(),
            status_str(r),
            format_number(r.total_streams),
            format_currency(r.total_revenue),
            r.created_at.format("%Y-%m-%d").to_string(),
        ])
        .style(style)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(16),
            Constraint::Length(9),
            Constraint::Length(16),
            Constraint::Length(11),
        ],
    )
    .block(Block::default().borders(Borders::ALL).title("REPORTS"))
    .header(Row::new(vec!["#", "name", "status", "streams", "revenue", "created"]).bold())
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(255, 140, 0)) // オレンジ色の背景
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    );

    let mut table_state = ratatui::widgets::TableState::default();
    if !app.reports.is_empty() {
        table_state.select(Some(app.ui.selected));
    }
    f.render_stateful_widget(table, area, &mut table_state);
}

/// 一覧用の短い状態ラベル。
fn status_str(r: &Report) -> String {
    match r.status {
        ReportStatus::Processing => format!(
            "{} {}%",
            progress_bar(r.processing_progress, 10),
            r.processing_progress
        ),
        ReportStatus::Completed => "Completed".into(),
        ReportStatus::Failed => "Failed".into(),
    }
}

/// 文字のプログレスバー（例: "████░░░░░░"）。
fn progress_bar(progress: u8, width: usize) -> String {
    let filled = (usize::from(progress.min(100)) * width + 50) / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// 右パネル：選択レポート、アップロード状態、アカウント、ログ。
fn build_info_text(app: &App) -> String {
    let mut lines = vec![];
    match app.selected_report() {
        Some(r) => {
            lines.push(format!("Selected: {}", r.display_name()));
            lines.push(format!("Period: {}", r.period()));
            lines.push(format!("Status: {}", status_str(r)));
            lines.push(format!("Files: {}/{}", r.processed_files, r.total_files));
            lines.push(format!("Rows: {}", format_grouped(r.total_rows)));
            lines.push(format!(
                "Tracks: {} matched, {} unmatched",
                r.matched_tracks, r.unmatched_tracks
            ));
            // サーバーのエラーログはそのまま出す。
            if let Some(err) = &r.error_log {
                lines.push(format!("Error: {err}"));
            }
        }
        None => lines.push("Selected: -".into()),
    }

    lines.push(String::new());
    lines.push(format!(
        "Upload: {} ({}%)",
        app.flow.state_name(),
        app.flow.progress()
    ));
    lines.push(format!(
        "Account: {} ({})",
        if app.cfg.account.email.is_empty() {
            "-"
        } else {
            app.cfg.account.email.as_str()
        },
        if app.ui.signed_in {
            "signed in"
        } else {
            "not signed in"
        }
    ));
    lines.push(format!("API: {}", app.cfg.api.base_url));

    lines.push(String::new());
    lines.push("Log:".into());
    lines.extend(app.ui.log.iter().rev().take(8).rev().cloned());
    lines.join("\n")
}

/// ステータスバーを構築する。
fn build_status_bar(app: &App) -> Paragraph<'static> {
    let processing = app
        .reports
        .iter()
        .filter(|r| r.status == ReportStatus::Processing)
        .count();
    let report_info = format!(
        "Reports: {} total, {} processing",
        app.reports.len(),
        processing
    );

    let status_text = if let Some(err) = &app.ui.error {
        format!("[{}] {} | ERROR: {}", app.ui.screen.name(), report_info, err)
    } else {
        format!("[{}] {} | {}", app.ui.screen.name(), report_info, app.ui.status)
    };

    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });

    // エラー時は赤色で強調表示する。
    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }
    status_bar
}

/// アップロードモーダルを描画する。
fn draw_upload_popup(f: &mut Frame, app: &App) {
    let area = layout::centered_popup(f.area(), 80, 24);
    f.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("UPLOAD [{}]", app.flow.state_name()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(inner);

    let body = Paragraph::new(upload_lines(&app.flow).join("\n")).wrap(Wrap { trim: false });
    f.render_widget(body, parts[0]);

    let progress = app.flow.progress().min(100);
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green))
        .percent(progress.into())
        .label(format!("{progress}%"));
    f.render_widget(gauge, parts[1]);
}

/// モーダル本文。状態ごとに中身が変わる。
fn upload_lines(flow: &UploadFlow) -> Vec<String> {
    let mut lines = vec![];
    match flow {
        UploadFlow::Idle(draft) => {
            lines.push(format!("Period: {}", draft.period()));
            lines.push(String::new());
            if draft.files.is_empty() {
                lines.push("No files selected.".into());
            } else {
                lines.push(format!("Files ({}):", draft.files.len()));
                lines.extend(draft.files.iter().map(|p| format!("  {}", p.display())));
            }
            lines.push(String::new());
            lines.push("A .zip with folders such as \"Q1 2025\" uploads every quarter it contains.".into());
        }
        UploadFlow::Unpacking { archive, .. } => {
            lines.push(format!("Unpacking {}...", archive.display()));
        }
        UploadFlow::ReviewingArchive { archive, groups } => {
            lines.push(format!("Archive: {}", archive.display()));
            lines.push(format!("{} quarters found:", groups.len()));
            for g in groups {
                lines.push(format!(
                    "  {}  {} files, {} bytes",
                    g.period(),
                    g.files.len(),
                    format_grouped(g.total_bytes() as u64)
                ));
            }
            lines.push(String::new());
            lines.push("Press Enter to upload all quarters.".into());
        }
        UploadFlow::Submitting {
            submission,
            checklist,
            ..
        } => {
            lines.push(match submission {
                Submission::Single { period, files } => {
                    format!("Uploading {files} files for {period}...")
                }
                Submission::Archive { done, total } => {
                    format!("Uploading quarters: {done}/{total}")
                }
            });
            lines.push(String::new());
            lines.extend(checklist_lines(checklist));
        }
        UploadFlow::Polling { checklist, .. } => {
            lines.push("Processing on the server...".into());
            lines.push(String::new());
            lines.extend(checklist_lines(checklist));
        }
        UploadFlow::Terminal { outcome, checklist } => {
            lines.push(outcome.headline());
            lines.push(String::new());
            lines.extend(checklist_lines(checklist));
            match outcome {
                Outcome::Batch(summary) => {
                    lines.push(String::new());
                    for r in &summary.results {
                        lines.push(match &r.outcome {
                            Ok(_) => format!("  [x] {}", r.period()),
                            Err(e) => format!("  [!] {}: {e}", r.period()),
                        });
                    }
                }
                Outcome::TimedOut { .. } => {
                    lines.push(String::new());
                    lines.push("The report is still processing. Press p to keep polling.".into());
                }
                _ => {}
            }
        }
    }
    lines
}

fn checklist_lines(steps: &[crate::checklist::ProcessingStep]) -> Vec<String> {
    steps
        .iter()
        .map(|s| match &s.detail {
            Some(d) => format!("{} {}  ({d})", status_marker(s.status), s.label),
            None => format!("{} {}", status_marker(s.status), s.label),
        })
        .collect()
}

/// 完了レポートの詳細画面を描画する。
fn draw_detail_screen(f: &mut Frame, app: &App, area: Rect) {
    f.render_widget(Clear, area);
    let Some((id, details)) = &app.details else {
        return;
    };
    let report = app.reports.iter().find(|r| r.id == *id);
    let detail_layout = layout::create_detail_layout(area);

    let header_text = match report {
        Some(r) => format!(
            "{} ({})\nStreams: {} | Revenue: {} | Rows: {} | Tracks: {} matched, {} unmatched",
            r.display_name(),
            r.period(),
            format_number(r.total_streams),
            format_currency(r.total_revenue),
            format_grouped(r.total_rows),
            r.matched_tracks,
            r.unmatched_tracks
        ),
        None => id.to_string(),
    };
    let header = Paragraph::new(header_text)
        .block(Block::default().borders(Borders::ALL).title("REPORT"))
        .wrap(Wrap { trim: true });
    f.render_widget(header, detail_layout.header);

    let Some(details) = details else {
        let loading = Paragraph::new("Loading details...")
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(loading, detail_layout.releases);
        return;
    };

    draw_payouts(f, details, detail_layout.payouts);
    draw_breakdown(f, details, detail_layout.platforms, detail_layout.countries);

    let releases = Paragraph::new(release_lines(details).join("\n"))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(
                    "RELEASES ({} matched of {})",
                    details.matched_releases(),
                    details.releases.len()
                )),
        )
        .scroll((app.ui.detail_scroll, 0));
    f.render_widget(releases, detail_layout.releases);
}

fn draw_payouts(f: &mut Frame, details: &ReportDetails, area: Rect) {
    let rows = details.payouts.iter().map(|p| {
        Row::new(vec![
            p.artist_name.clone(),
            format_currency(p.amount),
            p.status_label().to_string(),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Min(10),
            Constraint::Length(16),
            Constraint::Length(10),
        ],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("PAYOUTS {}", format_currency(details.payout_total()))),
    );
    f.render_widget(table, area);
}

/// プラットフォーム別・国別の上位を描画する。
fn draw_breakdown(f: &mut Frame, details: &ReportDetails, platforms: Rect, countries: Rect) {
    let widths = [
        Constraint::Min(8),
        Constraint::Length(7),
        Constraint::Length(14),
    ];

    let platform_rows = top_by_revenue(&details.platforms, TOP_ROWS)
        .into_iter()
        .map(|p| {
            let color = hex_to_rgb(platform_color(&p.name))
                .map_or(Color::Reset, |(r, g, b)| Color::Rgb(r, g, b));
            Row::new(vec![
                Cell::from(Line::from(vec![
                    Span::styled("■ ", Style::default().fg(color)),
                    Span::raw(p.name.clone()),
                ])),
                Cell::from(format_number(p.streams)),
                Cell::from(format_currency(p.revenue)),
            ])
        });
    let table = Table::new(platform_rows, widths)
        .block(Block::default().borders(Borders::ALL).title("PLATFORMS"));
    f.render_widget(table, platforms);

    let country_rows = top_by_revenue(&details.countries, TOP_ROWS)
        .into_iter()
        .map(|c| {
            Row::new(vec![
                format!("{} {}", country_flag(&c.name), c.name),
                format_number(c.streams),
                format_currency(c.revenue),
            ])
        });
    let table = Table::new(country_rows, widths)
        .block(Block::default().borders(Borders::ALL).title("COUNTRIES"));
    f.render_widget(table, countries);
}

/// リリースごとに見出し1行と、曲ごとの行。
fn release_lines(details: &ReportDetails) -> Vec<String> {
    let mut lines = vec![];
    for r in &details.releases {
        let mark = if r.is_matched { "[x]" } else { "[ ]" };
        let kind = r
            .release_type
            .as_deref()
            .map(|t| format!(" ({t})"))
            .unwrap_or_default();
        lines.push(format!(
            "{mark} {} - {}{kind}  {} {}  {}  {}",
            r.artist_name,
            r.release_title,
            r.tracks.len(),
            tracks_noun(r.tracks.len()),
            format_number(r.total_streams),
            format_currency(r.total_revenue)
        ));
        for (i, t) in r.tracks.iter().enumerate() {
            let isrc = t
                .isrc
                .as_deref()
                .map(|code| format!("  {code}"))
                .unwrap_or_default();
            lines.push(format!(
                "    {}. {}  {}  {}{isrc}",
                i + 1,
                t.track_title,
                format_number(t.streams),
                format_currency(t.revenue)
            ));
        }
    }
    if lines.is_empty() {
        lines.push("No releases in this report.".into());
    }
    lines
}

/// 削除確認ポップアップを描画する。
fn draw_confirm_delete(f: &mut Frame, app: &App) {
    let Some(report) = &app.pending_delete else {
        return;
    };
    let area = layout::centered_popup(f.area(), 70, 11);
    f.render_widget(Clear, area);

    let mut lines = delete_confirmation_lines(report);
    lines.push(String::new());
    lines.push(format!(
        "{}: delete | {}: cancel",
        format_keys(&app.shortcuts.confirm_delete.confirm),
        format_keys(&app.shortcuts.confirm_delete.cancel)
    ));
    let popup = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title("DELETE"))
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true });
    f.render_widget(popup, area);
}

/// 削除で失われるものを列挙する。
fn delete_confirmation_lines(report: &Report) -> Vec<String> {
    vec![
        format!("Delete report \"{}\"?", report.display_name()),
        format!(
            "{}: {} streams, {}",
            report.period(),
            format_number(report.total_streams),
            format_currency(report.total_revenue)
        ),
        "Removed: stream statistics, platform and country statistics,".into(),
        format!(
            "artist payouts for this report ({} in total).",
            format_currency(report.total_revenue)
        ),
        "Credited amounts are taken back from artist balances.".into(),
    ]
}

/// ウィザード画面を描画する。
fn draw_wizard_screen(f: &mut Frame, app: &App) {
    let outer_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(20), // 上部マージン
            Constraint::Min(10),        // 本文領域
            Constraint::Percentage(20), // 下部マージン
        ])
        .split(f.area());

    let content_text = format!(
        "=== Initial Setup Wizard ===\n\nStep {}/{}\n\n{}\n\nPress Enter to proceed, ESC to skip step.",
        app.wizard_state.get_step_number(),
        app.wizard_state.total_steps(),
        app.wizard_state.get_prompt()
    );
    let content = Paragraph::new(content_text)
        .block(Block::default().borders(Borders::ALL).title("Setup"))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
    f.render_widget(content, outer_layout[1]);

    // サインイン結果などのステータス。
    let status = Paragraph::new(app.ui.status.clone()).alignment(Alignment::Center);
    f.render_widget(status, outer_layout[2]);

    if let Some(err) = &app.ui.error {
        let error_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)])
            .split(f.area());
        let error_text = Paragraph::new(format!("ERROR: {}", err))
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true });
        f.render_widget(error_text, error_layout[1]);
    }
}

/// 現在画面に応じたヘルプ文字列を返す。
fn get_help_text(screen: &Screen, shortcuts: &Shortcuts) -> String {
    match screen {
        Screen::Main => {
            let sc = &shortcuts.main;
            format!(
                "{}: quit | {}: refresh | {}: upload | {}: details | {}: rename | {}: delete | {}: poll | {}: sign in | {}: settings | {}/{}: navigate",
                format_keys(&sc.quit),
                format_keys(&sc.refresh),
                format_keys(&sc.upload),
                format_keys(&sc.details),
                format_keys(&sc.rename),
                format_keys(&sc.delete),
                format_keys(&sc.resume_polling),
                format_keys(&sc.sign_in),
                format_keys(&sc.settings),
                format_keys(&sc.up),
                format_keys(&sc.down)
            )
        }
        Screen::Upload => {
            let sc = &shortcuts.upload;
            format!(
                "{}: add file | {}: remove last | {}: quarter | {}: year | {}: upload | {}: keep polling | {}: clear | {}: close",
                format_keys(&sc.add_file),
                format_keys(&sc.remove_file),
                format_keys(&sc.next_quarter),
                format_keys(&sc.year),
                format_keys(&sc.submit),
                format_keys(&sc.resume_polling),
                format_keys(&sc.reset),
                format_keys(&sc.close)
            )
        }
        Screen::ReportDetail => format!(
            "{}/{}: scroll releases | {}: back",
            format_keys(&shortcuts.detail.scroll_up),
            format_keys(&shortcuts.detail.scroll_down),
            format_keys(&shortcuts.detail.back)
        ),
        Screen::ConfirmDelete => format!(
            "{}: delete | {}: cancel",
            format_keys(&shortcuts.confirm_delete.confirm),
            format_keys(&shortcuts.confirm_delete.cancel)
        ),
        Screen::Settings => {
            let sc = &shortcuts.settings;
            format!(
                "{}: app url | {}: auth url | {}: api key | {}: email | {}: sign in | {}: sign out | {}: save | {}: cancel",
                format_keys(&sc.app_url),
                format_keys(&sc.auth_url),
                format_keys(&sc.anon_key),
                format_keys(&sc.email),
                format_keys(&sc.sign_in),
                format_keys(&sc.sign_out),
                format_keys(&sc.save),
                format_keys(&sc.cancel)
            )
        }
        Screen::InitialSetup => format!(
            "Follow wizard steps | {}: proceed | {}: skip step",
            format_keys(&shortcuts.wizard.proceed),
            format_keys(&shortcuts.wizard.skip)
        ),
    }
}

/// ショートカットキーの配列を表示用文字列に変換する。
fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fake_api::report_with,
        poller::PollOutcome,
        reports::{ReleaseSummary, TrackSummary},
        submit::{BatchSummary, GroupResult},
        upload::SingleDraft,
    };
    use uuid::Uuid;

    #[test]
    fn test_delete_confirmation_names_report() {
        let mut r = report_with(Uuid::new_v4(), ReportStatus::Completed, 100);
        r.notes = Some("Spring royalties".into());
        r.total_revenue = 1234.5;
        let lines = delete_confirmation_lines(&r);
        assert_eq!(lines[0], "Delete report \"Spring royalties\"?");
        assert_eq!(lines[1], "Q1 2025: 1.0K streams, 1 234,50 ₽");
        assert!(lines.iter().any(|l| l.contains("balances")));
    }

    #[test]
    fn test_progress_bar_rounds_to_cells() {
        assert_eq!(progress_bar(0, 10), "░░░░░░░░░░");
        assert_eq!(progress_bar(45, 10), "█████░░░░░");
        assert_eq!(progress_bar(100, 4), "████");
    }

    #[test]
    fn test_idle_lines_list_files() {
        let mut draft = SingleDraft::for_date(2024, 5);
        draft.add_file("a.csv".into());
        let lines = upload_lines(&UploadFlow::new(draft));
        assert_eq!(lines[0], "Period: Q2 2024");
        assert!(lines.contains(&"  a.csv".to_string()));
    }

    #[test]
    fn test_batch_outcome_lists_each_quarter() {
        let summary = BatchSummary {
            results: vec![
                GroupResult {
                    quarter: crate::reports::Quarter::Q1,
                    year: 2024,
                    outcome: Ok(Uuid::new_v4()),
                },
                GroupResult {
                    quarter: crate::reports::Quarter::Q2,
                    year: 2024,
                    outcome: Err("HTTP 500".into()),
                },
            ],
        };
        let flow = UploadFlow::Terminal {
            outcome: Outcome::Batch(summary),
            checklist: vec![],
        };
        let lines = upload_lines(&flow);
        assert_eq!(lines[0], "1/2 quarters uploaded, failed: Q2 2024");
        assert!(lines.contains(&"  [x] Q1 2024".to_string()));
        assert!(lines.contains(&"  [!] Q2 2024: HTTP 500".to_string()));
    }

    #[test]
    fn test_timed_out_offers_resume() {
        let id = Uuid::new_v4();
        let mut flow = UploadFlow::new(SingleDraft::for_date(2024, 1));
        flow.watch(&report_with(id, ReportStatus::Processing, 40)).unwrap();
        flow.poll_finished(PollOutcome::TimedOut { last: None }).unwrap();
        let lines = upload_lines(&flow);
        assert!(lines.last().unwrap().contains("Press p"));
    }

    #[test]
    fn test_release_lines_list_every_track() {
        let track = |t: &str| TrackSummary {
            track_title: t.into(),
            streams: 10,
            revenue: 1.0,
            isrc: (t == "C").then(|| "RU1".to_string()),
        };
        let details = ReportDetails {
            releases: vec![ReleaseSummary {
                release_id: None,
                release_type: Some("EP".into()),
                release_title: "Night".into(),
                artist_name: "Vera".into(),
                is_matched: true,
                total_streams: 30,
                total_revenue: 3.0,
                cover_url: None,
                tracks: vec![track("A"), track("B"), track("C")],
            }],
            ..Default::default()
        };
        let lines = release_lines(&details);
        assert!(lines[0].starts_with("[x] Vera - Night (EP)  3 трека"));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], format!("    1. A  10  {}", format_currency(1.0)));
        assert_eq!(lines[3], format!("    3. C  10  {}  RU1", format_currency(1.0)));
    }
}
