//! キー入力ハンドラー関数。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;

use crate::{
    archive,
    events::Screen,
    input::{InputBoxState, InputCallbackId},
    reports::ReportStatus,
    shortcuts,
    upload::UploadFlow,
    wizard::WizardStep,
    worker::WorkerCmd,
};

use super::{App, fresh_draft, request_refresh};

/// キー入力を1件処理し、終了すべきならtrueを返す。
pub async fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが開いていれば最優先で処理する。
    if app.input_box.is_some() {
        return handle_input_box_key(app, k).await;
    }

    // 画面ごとのハンドラへ委譲する。
    match app.ui.screen {
        Screen::Main => handle_main_key(app, k).await,
        Screen::Upload => handle_upload_key(app, k).await,
        Screen::ReportDetail => handle_detail_key(app, k),
        Screen::ConfirmDelete => handle_confirm_delete_key(app, k).await,
        Screen::Settings => handle_settings_key(app, k).await,
        Screen::InitialSetup => handle_wizard_key(app, k).await,
    }
}

/// Ctrl+Cかどうかを判定する。
pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

fn open_input(app: &mut App, prompt: &str, value: &str, callback_id: InputCallbackId) {
    app.input_box = Some(InputBoxState::new(prompt, value, callback_id));
}

fn open_password(app: &mut App, callback_id: InputCallbackId) {
    let prompt = format!("Password for {}:", app.email);
    app.input_box = Some(InputBoxState::secret(&prompt, callback_id));
}

/// レポート一覧画面のキー処理。
async fn handle_main_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.main;

    if shortcuts::matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if shortcuts::matches_shortcut(&k, &sc.settings) {
        // 設定画面へ遷移し、編集バッファを更新する。
        reload_settings_buffers(app);
        app.ui.screen = Screen::Settings;
        app.ui.status = "Settings".into();
    } else if shortcuts::matches_shortcut(&k, &sc.refresh) {
        request_refresh(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.upload) {
        app.ui.error = None;
        app.ui.screen = Screen::Upload;
    } else if shortcuts::matches_shortcut(&k, &sc.sign_in) {
        open_password(app, InputCallbackId::Password);
    } else if shortcuts::matches_shortcut(&k, &sc.down) {
        if app.ui.selected + 1 < app.reports.len() {
            app.ui.selected += 1;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.up) {
        app.ui.selected = app.ui.selected.saturating_sub(1);
    } else if shortcuts::matches_shortcut(&k, &sc.resume_polling) {
        resume_polling(app).await?;
    } else if let Some(report) = app.selected_report().cloned() {
        let sc = &app.shortcuts.main;
        if shortcuts::matches_shortcut(&k, &sc.details) {
            // 集計は完了したレポートにしか無い。
            if report.status == ReportStatus::Completed {
                app.details = Some((report.id, None));
                app.ui.detail_scroll = 0;
                app.ui.screen = Screen::ReportDetail;
                app.ui.status = format!("Loading {}...", report.display_name());
                app.worker_tx.send(WorkerCmd::LoadDetails(report.id)).await?;
            } else {
                app.ui.status = format!("{} is not completed yet", report.display_name());
            }
        } else if shortcuts::matches_shortcut(&k, &sc.rename) {
            open_input(
                app,
                "Report name (empty to clear):",
                &report.rename_default(),
                InputCallbackId::RenameReport(report.id),
            );
        } else if shortcuts::matches_shortcut(&k, &sc.delete) {
            app.pending_delete = Some(report);
            app.ui.screen = Screen::ConfirmDelete;
        }
    }

    Ok(false)
}

/// タイムアウトしたアップロードか、選択中の処理中レポートのポーリングを再開する。
async fn resume_polling(app: &mut App) -> Result<()> {
    let res = match app.flow.resume() {
        Ok(id) => Ok(id),
        Err(_) => match app.selected_report().cloned() {
            Some(report) => app.flow.watch(&report).map(|_| report.id),
            None => {
                app.ui.status = "Nothing to poll".into();
                return Ok(());
            }
        },
    };
    match res {
        Ok(id) => {
            app.worker_tx.send(WorkerCmd::ResumePolling(id)).await?;
            app.ui.screen = Screen::Upload;
            app.ui.status = "Polling resumed".into();
        }
        Err(e) => app.ui.status = format!("Cannot poll: {e}"),
    }
    Ok(())
}

/// アップロード画面のキー処理。
async fn handle_upload_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.upload;

    if shortcuts::matches_shortcut(&k, &sc.close) {
        // 実行中の処理はバックグラウンドで続け、それ以外は下書きを破棄する。
        if !app.flow.is_busy() {
            app.flow = UploadFlow::new(fresh_draft());
        }
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.add_file) {
        if app.flow.is_busy() {
            app.ui.status = format!("Upload is {}", app.flow.state_name());
        } else {
            open_input(
                app,
                "File path (.csv, .xlsx, .xls or .zip):",
                "",
                InputCallbackId::UploadFile,
            );
        }
    } else if shortcuts::matches_shortcut(&k, &sc.remove_file) {
        if let Some(draft) = app.flow.draft_mut()
            && let Some(removed) = draft.remove_last()
        {
            app.ui.status = format!("Removed {}", removed.display());
        }
    } else if shortcuts::matches_shortcut(&k, &sc.next_quarter) {
        if let Some(draft) = app.flow.draft_mut() {
            draft.quarter = draft.quarter.next();
        }
    } else if shortcuts::matches_shortcut(&k, &sc.year) {
        if let Some(year) = app.flow.draft().map(|d| d.year.to_string()) {
            open_input(app, "Year:", &year, InputCallbackId::UploadYear);
        }
    } else if shortcuts::matches_shortcut(&k, &sc.submit) {
        submit_upload(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.resume_polling) {
        match app.flow.resume() {
            Ok(id) => {
                app.worker_tx.send(WorkerCmd::ResumePolling(id)).await?;
                app.ui.status = "Polling resumed".into();
            }
            Err(e) => app.ui.status = format!("Cannot resume: {e}"),
        }
    } else if shortcuts::matches_shortcut(&k, &sc.reset) {
        match app.flow.reset(fresh_draft()) {
            Ok(()) => {
                app.ui.error = None;
                app.ui.status = "Upload cleared".into();
            }
            Err(e) => app.ui.status = format!("Cannot reset: {e}"),
        }
    }

    Ok(false)
}

/// 下書きかレビュー中のアーカイブを送信する。
async fn submit_upload(app: &mut App) -> Result<()> {
    let cmd = if matches!(app.flow, UploadFlow::ReviewingArchive { .. }) {
        app.flow.begin_archive().map(WorkerCmd::UploadArchive)
    } else {
        app.flow.begin_single().map(WorkerCmd::UploadSingle)
    };
    match cmd {
        Ok(cmd) => {
            app.ui.error = None;
            app.ui.status = "Uploading...".into();
            app.worker_tx.send(cmd).await?;
        }
        Err(e) => app.ui.status = format!("Cannot upload: {e}"),
    }
    Ok(())
}

/// 詳細画面のキー処理。
fn handle_detail_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.detail;

    if shortcuts::matches_shortcut(&k, &sc.back) {
        app.details = None;
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.scroll_down) {
        app.ui.detail_scroll = app.ui.detail_scroll.saturating_add(1);
    } else if shortcuts::matches_shortcut(&k, &sc.scroll_up) {
        app.ui.detail_scroll = app.ui.detail_scroll.saturating_sub(1);
    }

    Ok(false)
}

/// 削除確認のキー処理。
async fn handle_confirm_delete_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.confirm_delete;

    if shortcuts::matches_shortcut(&k, &sc.confirm) {
        if let Some(report) = app.pending_delete.take() {
            app.worker_tx.send(WorkerCmd::Delete(report.id)).await?;
            app.ui.status = format!("Deleting {}...", report.display_name());
        }
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        app.pending_delete = None;
        app.ui.screen = Screen::Main;
    }

    Ok(false)
}

/// 設定画面のキー処理。
async fn handle_settings_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.settings;

    if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 変更を破棄してメイン画面へ戻る。
        reload_settings_buffers(app);
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.save) {
        save_settings(app).await?;
        app.ui.screen = Screen::Main;
        app.ui.status = "Saved settings".into();
    } else if shortcuts::matches_shortcut(&k, &sc.app_url) {
        let v = app.app_url.clone();
        open_input(app, "Web app URL:", &v, InputCallbackId::SettingsAppUrl);
    } else if shortcuts::matches_shortcut(&k, &sc.auth_url) {
        let v = app.auth_url.clone();
        open_input(app, "Auth service URL:", &v, InputCallbackId::SettingsAuthUrl);
    } else if shortcuts::matches_shortcut(&k, &sc.anon_key) {
        let v = app.anon_key.clone();
        open_input(app, "Public API key:", &v, InputCallbackId::SettingsAnonKey);
    } else if shortcuts::matches_shortcut(&k, &sc.email) {
        let v = app.email.clone();
        open_input(app, "Admin email:", &v, InputCallbackId::SettingsEmail);
    } else if shortcuts::matches_shortcut(&k, &sc.sign_in) {
        open_password(app, InputCallbackId::Password);
    } else if shortcuts::matches_shortcut(&k, &sc.sign_out) {
        app.worker_tx.send(WorkerCmd::SignOut).await?;
    }

    Ok(false)
}

/// 編集バッファを設定へ反映し、保存してWorkerへ通知する。
async fn save_settings(app: &mut App) -> Result<()> {
    app.cfg.api.base_url = app.app_url.trim().to_string();
    app.cfg.auth.url = app.auth_url.trim().to_string();
    app.cfg.auth.anon_key = app.anon_key.trim().to_string();
    app.cfg.account.email = app.email.trim().to_string();
    app.cfg.save(&app.cfg_path)?;
    app.worker_tx
        .send(WorkerCmd::SaveSettings(app.cfg.clone()))
        .await?;
    Ok(())
}

/// 初期設定ウィザード画面のキー処理。
async fn handle_wizard_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.wizard;

    if shortcuts::matches_shortcut(&k, &sc.proceed) {
        match app.wizard_state.current_step {
            WizardStep::Welcome => app.wizard_state.next_step(),
            WizardStep::AppUrl => {
                let v = app.app_url.clone();
                open_input(app, "Web app URL:", &v, InputCallbackId::WizardAppUrl);
            }
            WizardStep::AuthUrl => {
                let v = app.auth_url.clone();
                open_input(app, "Auth service URL:", &v, InputCallbackId::WizardAuthUrl);
            }
            WizardStep::AnonKey => {
                let v = app.anon_key.clone();
                open_input(app, "Public API key:", &v, InputCallbackId::WizardAnonKey);
            }
            WizardStep::Email => {
                let v = app.email.clone();
                open_input(app, "Admin email:", &v, InputCallbackId::WizardEmail);
            }
            WizardStep::SignIn => {
                // サインイン前にWorkerのクライアントを新しい設定で作り直す。
                save_settings(app).await?;
                open_password(app, InputCallbackId::WizardPassword);
            }
            WizardStep::Complete => {
                save_settings(app).await?;
                let missing = app.cfg.missing_fields();
                if !missing.is_empty() {
                    app.ui.error = Some(format!("Required fields are missing: {}", missing.join(", ")));
                    app.wizard_state.current_step = WizardStep::AppUrl;
                    return Ok(false);
                }
                app.ui.error = None;
                app.ui.screen = Screen::Main;
                app.ui.status = "Setup complete!".into();
                request_refresh(app).await?;
            }
        }
    } else if shortcuts::matches_shortcut(&k, &sc.skip) {
        app.wizard_state.next_step();
    }

    Ok(false)
}

/// 入力ボックスのキー処理。
async fn handle_input_box_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let Some(input_state) = &mut app.input_box else {
        return Ok(false);
    };
    let sc = &app.shortcuts.input_box;

    // 入力ボックス中でもCtrl+Cで終了できるようにする。
    if is_ctrl_c(&k) {
        return Ok(true);
    }

    if shortcuts::matches_shortcut(&k, &sc.confirm) {
        // 入力ボックスを閉じる前に値とコールバック種別を保存する。
        let value = input_state.value.clone();
        let callback_id = input_state.callback_id.clone();
        app.input_box = None;
        apply_input_callback(app, callback_id, value).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        app.input_box = None;
    } else if shortcuts::matches_shortcut(&k, &sc.backspace) {
        input_state.backspace();
    } else if shortcuts::matches_shortcut(&k, &sc.delete) {
        input_state.delete();
    } else if shortcuts::matches_shortcut(&k, &sc.left) {
        input_state.move_left();
    } else if shortcuts::matches_shortcut(&k, &sc.right) {
        input_state.move_right();
    } else if shortcuts::matches_shortcut(&k, &sc.home) {
        input_state.move_home();
    } else if shortcuts::matches_shortcut(&k, &sc.end) {
        input_state.move_end();
    } else if shortcuts::matches_shortcut(&k, &sc.clear_line) {
        input_state.clear_line();
    } else if let KeyCode::Char(c) = k.code
        && !k.modifiers.contains(KeyModifiers::CONTROL)
    {
        input_state.insert_char(c);
    }

    Ok(false)
}

/// 入力ボックスのコールバックを適用する。
async fn apply_input_callback(
    app: &mut App,
    callback_id: InputCallbackId,
    value: String,
) -> Result<()> {
    match callback_id {
        InputCallbackId::SettingsAppUrl => app.app_url = value,
        InputCallbackId::SettingsAuthUrl => app.auth_url = value,
        InputCallbackId::SettingsAnonKey => app.anon_key = value,
        InputCallbackId::SettingsEmail => app.email = value,
        InputCallbackId::WizardAppUrl => {
            app.app_url = value;
            app.wizard_state.next_step();
        }
        InputCallbackId::WizardAuthUrl => {
            app.auth_url = value;
            app.wizard_state.next_step();
        }
        InputCallbackId::WizardAnonKey => {
            app.anon_key = value;
            app.wizard_state.next_step();
        }
        InputCallbackId::WizardEmail => {
            app.email = value;
            app.wizard_state.next_step();
        }
        InputCallbackId::WizardPassword => {
            app.worker_tx.send(WorkerCmd::SignIn { password: value }).await?;
            app.ui.status = "Signing in...".into();
            app.wizard_state.next_step();
        }
        InputCallbackId::Password => {
            app.worker_tx.send(WorkerCmd::SignIn { password: value }).await?;
            app.ui.status = "Signing in...".into();
        }
        InputCallbackId::UploadFile => add_upload_file(app, &value).await?,
        InputCallbackId::UploadYear => match value.trim().parse::<i32>() {
            Ok(year) if (1900..=9999).contains(&year) => {
                if let Some(draft) = app.flow.draft_mut() {
                    draft.year = year;
                }
            }
            _ => app.ui.error = Some(format!("Invalid year: {value}")),
        },
        InputCallbackId::RenameReport(id) => {
            app.worker_tx.send(WorkerCmd::Rename { id, name: value }).await?;
            app.ui.status = "Renaming...".into();
        }
    }
    Ok(())
}

/// ZIPなら展開を依頼し、表計算ファイルなら下書きへ追加する。
async fn add_upload_file(app: &mut App, value: &str) -> Result<()> {
    let raw = value.trim().trim_matches(|c| c == '"' || c == '\'');
    if raw.is_empty() {
        return Ok(());
    }
    let path = PathBuf::from(raw);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !path.is_file() {
        app.ui.error = Some(format!("File not found: {raw}"));
        return Ok(());
    }

    if archive::is_zip(&name) {
        match app.flow.start_unpack(path.clone(), fresh_draft()) {
            Ok(()) => {
                app.ui.error = None;
                app.ui.status = format!("Unpacking {name}...");
                app.worker_tx.send(WorkerCmd::UnpackArchive(path)).await?;
            }
            Err(e) => app.ui.status = format!("Cannot unpack: {e}"),
        }
    } else if archive::spreadsheet_mime(&name).is_some() {
        match app.flow.draft_mut() {
            Some(draft) => {
                if draft.add_file(path) {
                    app.ui.error = None;
                    app.ui.status = format!("Added {name}");
                } else {
                    app.ui.status = format!("{name} is already selected");
                }
            }
            None => app.ui.status = "Reset the current upload first".into(),
        }
    } else {
        app.ui.error = Some(format!("Unsupported file type: {name}"));
    }
    Ok(())
}

/// 設定画面用の編集バッファを設定値から再読み込みする。
fn reload_settings_buffers(app: &mut App) {
    app.app_url = app.cfg.api.base_url.clone();
    app.auth_url = app.cfg.auth.url.clone();
    app.anon_key = app.cfg.auth.anon_key.clone();
    app.email = app.cfg.account.email.clone();
}
