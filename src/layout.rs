//! レイアウト計算のヘルパー関数

use ratatui::prelude::*;

/// メインレイアウトの3つの領域
pub struct MainLayout {
    /// レポート一覧 + INFOパネルの領域
    pub body: Rect,
    /// HELPバーの領域
    pub help_bar: Rect,
    /// STATUSバーの領域
    pub status_bar: Rect,
}

/// ボディ部の2つの領域
pub struct BodyLayout {
    pub reports_table: Rect,
    pub info_panel: Rect,
}

/// 詳細画面の領域
pub struct DetailLayout {
    /// 期間・合計の見出し
    pub header: Rect,
    pub payouts: Rect,
    pub platforms: Rect,
    pub countries: Rect,
    pub releases: Rect,
}

/// メイン画面を分割（Body + HELP + STATUS）
pub fn create_main_layout(area: Rect) -> MainLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);

    MainLayout {
        body: chunks[0],
        help_bar: chunks[1],
        status_bar: chunks[2],
    }
}

/// Body領域を分割（一覧 65% + INFO 35%）
pub fn create_body_layout(area: Rect) -> BodyLayout {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    BodyLayout {
        reports_table: chunks[0],
        info_panel: chunks[1],
    }
}

/// 詳細画面を分割（見出し / 支払い・プラットフォーム・国 / リリース）
pub fn create_detail_layout(area: Rect) -> DetailLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(10),
            Constraint::Min(5),
        ])
        .split(area);
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ])
        .split(rows[1]);

    DetailLayout {
        header: rows[0],
        payouts: middle[0],
        platforms: middle[1],
        countries: middle[2],
        releases: rows[2],
    }
}

/// 中央配置のポップアップ領域（幅は%、高さは行数）
pub fn centered_popup(area: Rect, width_percent: u16, height: u16) -> Rect {
    let height = height.min(area.height);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((area.height - height) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}
