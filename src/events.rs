//! 画面遷移用のUI状態と画面種別。

/// TUIで現在表示中の画面。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// レポート一覧。
    Main,
    /// アップロード用モーダル。
    Upload,
    /// 完了レポートの集計詳細。
    ReportDetail,
    /// 削除確認。
    ConfirmDelete,
    /// 設定編集画面。
    Settings,
    /// 初期設定ウィザード画面。
    InitialSetup,
}

impl Screen {
    /// ステータスバー用の画面名。
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Main => "Main",
            Screen::Upload => "Upload",
            Screen::ReportDetail => "Details",
            Screen::ConfirmDelete => "Delete",
            Screen::Settings => "Settings",
            Screen::InitialSetup => "Setup",
        }
    }
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    /// 現在の画面。
    pub screen: Screen,
    /// レポート一覧の選択行。
    pub selected: usize,
    /// 右側パネルに表示するログ。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// エラーメッセージ（強調表示用）。
    pub error: Option<String>,
    /// 詳細画面のスクロール位置。
    pub detail_scroll: u16,
    /// サインイン済みかどうか。
    pub signed_in: bool,
}

impl UiState {
    pub fn new(screen: Screen) -> Self {
        Self {
            screen,
            selected: 0,
            log: vec![],
            status: "Ready".into(),
            error: None,
            detail_scroll: 0,
            signed_in: false,
        }
    }

    /// ログを追加する（古いものから捨てる）。
    pub fn push_log(&mut self, line: String) {
        const MAX_LOG: usize = 200;
        self.log.push(line);
        if self.log.len() > MAX_LOG {
            let excess = self.log.len() - MAX_LOG;
            self.log.drain(..excess);
        }
    }

    /// 選択行を件数内に収める。
    pub fn clamp_selection(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}
