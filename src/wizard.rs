//! 初期設定ウィザードのステート管理。

/// ウィザードの各ステップ
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardStep {
    Welcome,
    /// Webアプリ（レポートAPI）のURL
    AppUrl,
    /// 認証サービスのURL
    AuthUrl,
    /// 認証サービスの公開キー
    AnonKey,
    /// 管理者アカウントのメール
    Email,
    /// パスワードでサインイン
    SignIn,
    Complete,
}

const ORDER: [WizardStep; 7] = [
    WizardStep::Welcome,
    WizardStep::AppUrl,
    WizardStep::AuthUrl,
    WizardStep::AnonKey,
    WizardStep::Email,
    WizardStep::SignIn,
    WizardStep::Complete,
];

/// ウィザードの状態管理
#[derive(Clone, Debug)]
pub struct WizardState {
    pub current_step: WizardStep,
}

impl WizardState {
    pub fn new() -> Self {
        Self {
            current_step: WizardStep::Welcome,
        }
    }

    pub fn total_steps(&self) -> usize {
        ORDER.len()
    }

    /// 次のステップへ進む（Completeで止まる）
    pub fn next_step(&mut self) {
        let i = self.get_step_number();
        if let Some(next) = ORDER.get(i) {
            self.current_step = *next;
        }
    }

    /// 現在のステップ番号（1始まり）
    pub fn get_step_number(&self) -> usize {
        ORDER
            .iter()
            .position(|s| *s == self.current_step)
            .map_or(1, |i| i + 1)
    }

    /// 現在のステップの説明文
    pub fn get_prompt(&self) -> &'static str {
        match self.current_step {
            WizardStep::Welcome => {
                "Welcome to royalty_reports_tui.\n\nThis wizard connects the client to the label platform.\nPress Enter to start."
            }
            WizardStep::AppUrl => {
                "Web app URL\n\nOrigin of the admin app that serves /api/admin/reports,\ne.g. https://label.example\nPress Enter to edit."
            }
            WizardStep::AuthUrl => {
                "Auth service URL\n\nOrigin of the auth service that issues access tokens.\nPress Enter to edit."
            }
            WizardStep::AnonKey => {
                "Public API key\n\nThe anon key sent with sign-in requests.\nPress Enter to edit."
            }
            WizardStep::Email => "Admin email\n\nAccount used to sign in.\nPress Enter to edit.",
            WizardStep::SignIn => {
                "Sign in\n\nEnter the account password. It is not stored; only the session is cached.\nPress Enter to sign in, Esc to do it later."
            }
            WizardStep::Complete => {
                "Setup complete.\n\nPress Enter to open the report list."
            }
        }
    }
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}
