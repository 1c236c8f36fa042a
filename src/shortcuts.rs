//! ショートカット設定の管理。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ショートカット設定の全体（shortcut.toml）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortcuts {
    pub main: MainShortcuts,
    pub upload: UploadShortcuts,
    pub detail: DetailShortcuts,
    pub confirm_delete: ConfirmDeleteShortcuts,
    pub settings: SettingsShortcuts,
    pub wizard: WizardShortcuts,
    pub input_box: InputBoxShortcuts,
}

/// レポート一覧のショートカット。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainShortcuts {
    pub quit: Vec<String>,
    pub settings: Vec<String>,
    pub refresh: Vec<String>,
    pub upload: Vec<String>,
    pub details: Vec<String>,
    pub rename: Vec<String>,
    pub delete: Vec<String>,
    pub resume_polling: Vec<String>,
    pub sign_in: Vec<String>,
    pub down: Vec<String>,
    pub up: Vec<String>,
}

/// アップロード画面のショートカット。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadShortcuts {
    pub close: Vec<String>,
    pub add_file: Vec<String>,
    pub remove_file: Vec<String>,
    pub next_quarter: Vec<String>,
    pub year: Vec<String>,
    pub submit: Vec<String>,
    pub resume_polling: Vec<String>,
    pub reset: Vec<String>,
}

/// 詳細画面のショートカット。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailShortcuts {
    pub back: Vec<String>,
    pub scroll_down: Vec<String>,
    pub scroll_up: Vec<String>,
}

/// 削除確認のショートカット。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmDeleteShortcuts {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
}

/// 設定画面のショートカット。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsShortcuts {
    pub cancel: Vec<String>,
    pub save: Vec<String>,
    pub app_url: Vec<String>,
    pub auth_url: Vec<String>,
    pub anon_key: Vec<String>,
    pub email: Vec<String>,
    pub sign_in: Vec<String>,
    pub sign_out: Vec<String>,
}

/// ウィザード画面のショートカット。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardShortcuts {
    pub proceed: Vec<String>,
    pub skip: Vec<String>,
}

/// InputBoxのショートカット。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBoxShortcuts {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub backspace: Vec<String>,
    pub delete: Vec<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub home: Vec<String>,
    pub end: Vec<String>,
    pub clear_line: Vec<String>,
}

impl Shortcuts {
    /// TOMLから読み込む。無ければ既定値を書き出して返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            // 既存ファイルを読み込んでパースする。
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            // 未作成の場合は既定値を書き出して利用する。
            let shortcuts = Self::default();
            shortcuts.save(path)?;
            Ok(shortcuts)
        }
    }

    /// TOMLとして保存する。
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // 文字列にシリアライズする。
        let content = toml::to_string_pretty(self)?;
        // ファイルへ書き込む。
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn keys(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            main: MainShortcuts {
                quit: keys(&["q"]),
                settings: keys(&["t"]),
                refresh: keys(&["r"]),
                upload: keys(&["u"]),
                details: keys(&["Enter"]),
                rename: keys(&["n"]),
                delete: keys(&["d"]),
                resume_polling: keys(&["p"]),
                sign_in: keys(&["s"]),
                down: keys(&["Down", "j"]),
                up: keys(&["Up", "k"]),
            },
            upload: UploadShortcuts {
                close: keys(&["Esc"]),
                add_file: keys(&["a"]),
                remove_file: keys(&["x"]),
                next_quarter: keys(&["Tab"]),
                year: keys(&["y"]),
                submit: keys(&["Enter"]),
                resume_polling: keys(&["p"]),
                reset: keys(&["c"]),
            },
            detail: DetailShortcuts {
                back: keys(&["Esc", "q"]),
                scroll_down: keys(&["Down", "j"]),
                scroll_up: keys(&["Up", "k"]),
            },
            confirm_delete: ConfirmDeleteShortcuts {
                confirm: keys(&["y"]),
                cancel: keys(&["n", "Esc"]),
            },
            settings: SettingsShortcuts {
                cancel: keys(&["Esc"]),
                save: keys(&["Enter"]),
                app_url: keys(&["a"]),
                auth_url: keys(&["u"]),
                anon_key: keys(&["k"]),
                email: keys(&["e"]),
                sign_in: keys(&["s"]),
                sign_out: keys(&["o"]),
            },
            wizard: WizardShortcuts {
                proceed: keys(&["Enter"]),
                skip: keys(&["Esc"]),
            },
            // 文字キーは入力に使うため、移動は特殊キーのみ。
            input_box: InputBoxShortcuts {
                confirm: keys(&["Enter"]),
                cancel: keys(&["Esc"]),
                backspace: keys(&["Backspace"]),
                delete: keys(&["Delete"]),
                left: keys(&["Left"]),
                right: keys(&["Right"]),
                home: keys(&["Home"]),
                end: keys(&["End"]),
                clear_line: keys(&["Ctrl+u"]),
            },
        }
    }
}

/// KeyEventがいずれかのショートカット文字列と一致するか判定する。
pub fn matches_shortcut(key: &KeyEvent, shortcuts: &[String]) -> bool {
    shortcuts.iter().any(|s| matches_single_shortcut(key, s))
}

/// KeyEventが単一のショートカット文字列と一致するか判定する。
fn matches_single_shortcut(key: &KeyEvent, shortcut: &str) -> bool {
    // ショートカット文字列を分解する（例: "Ctrl+u", "a", "Enter"）。
    let parts: Vec<&str> = shortcut.split('+').collect();

    let (modifiers_str, key_str) = if parts.len() > 1 {
        // 修飾キー付きの形式（例: "Ctrl+u"）。
        (&parts[0..parts.len() - 1], parts[parts.len() - 1])
    } else {
        // 修飾キーなしの形式（例: "a", "Enter"）。
        (&[][..], parts[0])
    };

    // 修飾キーを解析して期待値を作る。
    let mut expected_modifiers = KeyModifiers::empty();
    for modifier in modifiers_str {
        match *modifier {
            "Ctrl" | "ctrl" => expected_modifiers |= KeyModifiers::CONTROL,
            "Alt" | "alt" => expected_modifiers |= KeyModifiers::ALT,
            "Shift" | "shift" => expected_modifiers |= KeyModifiers::SHIFT,
            _ => return false,
        }
    }

    // 修飾キーが一致しなければ即座に不一致とする。
    if key.modifiers != expected_modifiers {
        return false;
    }

    // キーコードの種別ごとに一致判定を行う。
    match key_str {
        "Enter" | "enter" => key.code == KeyCode::Enter,
        "Esc" | "esc" => key.code == KeyCode::Esc,
        "Tab" | "tab" => key.code == KeyCode::Tab,
        "Backspace" | "backspace" => key.code == KeyCode::Backspace,
        "Delete" | "delete" => key.code == KeyCode::Delete,
        "Up" | "up" => key.code == KeyCode::Up,
        "Down" | "down" => key.code == KeyCode::Down,
        "Left" | "left" => key.code == KeyCode::Left,
        "Right" | "right" => key.code == KeyCode::Right,
        "Home" | "home" => key.code == KeyCode::Home,
        "End" | "end" => key.code == KeyCode::End,
        // 単一文字（非ASCII含む）は Char として比較する。
        s => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => key.code == KeyCode::Char(c),
                _ => false,
            }
        }
    }
}
