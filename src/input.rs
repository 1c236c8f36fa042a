//! TUI内での文字列入力コンポーネント（InputBox）。

use ratatui::{
    layout::Alignment,
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph},
};
use uuid::Uuid;

use crate::layout::centered_popup;

/// InputBox入力状態
#[derive(Clone, Debug)]
pub struct InputBoxState {
    /// プロンプトメッセージ
    pub prompt: String,
    /// 現在の入力値
    pub value: String,
    /// カーソル位置（文字単位）
    pub cursor: usize,
    /// 入力完了時のコールバック識別子
    pub callback_id: InputCallbackId,
    /// パスワード入力なら伏せ字で表示する
    pub masked: bool,
}

/// 入力完了時のコールバック識別子
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputCallbackId {
    // Settings画面用
    SettingsAppUrl,
    SettingsAuthUrl,
    SettingsAnonKey,
    SettingsEmail,

    // Wizard画面用
    WizardAppUrl,
    WizardAuthUrl,
    WizardAnonKey,
    WizardEmail,
    WizardPassword,

    // サインイン（どの画面からでも）
    Password,

    // Upload画面用
    UploadFile,
    UploadYear,

    // 一覧からのリネーム
    RenameReport(Uuid),
}

impl InputBoxState {
    /// 初期値の末尾にカーソルを置いて開く。
    pub fn new(prompt: &str, value: &str, callback_id: InputCallbackId) -> Self {
        Self {
            prompt: prompt.into(),
            value: value.into(),
            cursor: value.chars().count(),
            callback_id,
            masked: false,
        }
    }

    /// 伏せ字の空入力として開く。
    pub fn secret(prompt: &str, callback_id: InputCallbackId) -> Self {
        Self {
            masked: true,
            ..Self::new(prompt, "", callback_id)
        }
    }

    /// 文字のバイト位置（char単位のカーソルから換算）
    fn byte_at(&self, char_idx: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_idx)
            .map_or(self.value.len(), |(i, _)| i)
    }

    /// 文字を挿入
    pub fn insert_char(&mut self, c: char) {
        // カーソル位置をバイト位置へ換算する。
        let at = self.byte_at(self.cursor);
        // 新しい文字を挿入してカーソルを進める。
        self.value.insert(at, c);
        self.cursor += 1;
    }

    /// Backspace（カーソル前の文字を削除）
    pub fn backspace(&mut self) {
        // カーソルが先頭なら何もしない。
        if self.cursor > 0 {
            // カーソル直前の文字を取り除く。
            let at = self.byte_at(self.cursor - 1);
            self.value.remove(at);
            // カーソル位置を左へ移動する。
            self.cursor -= 1;
        }
    }

    /// Delete（カーソル位置の文字を削除）
    pub fn delete(&mut self) {
        // カーソルが末尾なら何もしない。
        if self.cursor < self.value.chars().count() {
            // カーソル位置の文字を取り除く。
            let at = self.byte_at(self.cursor);
            self.value.remove(at);
        }
    }

    /// カーソルを左に移動
    pub fn move_left(&mut self) {
        // 先頭より左へは移動しない。
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// カーソルを右に移動
    pub fn move_right(&mut self) {
        // 末尾を超えないようにする。
        if self.cursor < self.value.chars().count() {
            self.cursor += 1;
        }
    }

    /// カーソルを先頭に移動
    pub fn move_home(&mut self) {
        // カーソルを0に戻す。
        self.cursor = 0;
    }

    /// カーソルを末尾に移動
    pub fn move_end(&mut self) {
        // 文字数分だけカーソルを進める。
        self.cursor = self.value.chars().count();
    }

    /// 行全体をクリア
    pub fn clear_line(&mut self) {
        // 入力値を空にし、カーソルも先頭へ。
        self.value.clear();
        self.cursor = 0;
    }

    /// 表示用の文字列（伏せ字対応）
    fn display_value(&self) -> String {
        if self.masked {
            "*".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }
}

/// InputBoxをポップアップとして描画
pub fn render_input_box(f: &mut Frame, state: &InputBoxState) {
    // 中央に配置されたポップアップ領域を計算する。
    let popup_area = centered_popup(f.area(), 70, 7);

    // 既存の描画を消してポップアップ用の背景にする。
    f.render_widget(Clear, popup_area);

    // ポップアップの外枠とスタイルを描画する。
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Input")
        .style(Style::default().bg(Color::DarkGray));
    f.render_widget(block, popup_area);

    // 内部レイアウト（プロンプト + 入力フィールド + ヘルプ）を定義する。
    let inner_layout = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // プロンプト
            Constraint::Length(1), // 入力フィールド
            Constraint::Length(1), // 空行
            Constraint::Length(1), // ヘルプ
        ])
        .split(popup_area);

    // プロンプトメッセージを描画する。
    let prompt_widget = Paragraph::new(state.prompt.clone()).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    f.render_widget(prompt_widget, inner_layout[0]);

    // カーソルが表示幅を超えたら横スクロールする。
    let display_width = inner_layout[1].width as usize;
    let scroll_offset = state.cursor.saturating_sub(display_width.saturating_sub(2));

    // 現在の入力値（伏せ字なら*）を可視範囲に切り出す。
    let chars: Vec<char> = state.display_value().chars().collect();
    let visible: Vec<char> = chars
        .iter()
        .skip(scroll_offset)
        .take(display_width)
        .copied()
        .collect();
    // カーソル位置に|を挿入して表現する。
    let cursor_in_visible = state.cursor.saturating_sub(scroll_offset).min(visible.len());
    let before: String = visible[..cursor_in_visible].iter().collect();
    let after: String = visible[cursor_in_visible..].iter().collect();

    // 文字列とカーソルを含む入力欄を描画する。
    let input_widget =
        Paragraph::new(format!("{before}|{after}")).style(Style::default().fg(Color::Green));
    f.render_widget(input_widget, inner_layout[1]);

    // ヘルプテキストを描画する。
    let help = Paragraph::new("Enter=confirm | Esc=cancel | Ctrl+U=clear")
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(help, inner_layout[3]);
}
