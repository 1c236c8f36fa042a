//! 四半期レポートと集計結果のモデル。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ロイヤリティ期間を表す四半期（Q1〜Q4）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    /// 1〜4の番号から四半期を得る。
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(Quarter::Q1),
            2 => Some(Quarter::Q2),
            3 => Some(Quarter::Q3),
            4 => Some(Quarter::Q4),
            _ => None,
        }
    }

    /// 四半期番号（1〜4）。
    pub fn number(self) -> u32 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }

    /// 次の四半期（Q4の次はQ1）。
    pub fn next(self) -> Self {
        // 4で折り返して巡回させる。
        Self::from_number(self.number() % 4 + 1).unwrap_or(Quarter::Q1)
    }

    /// 月から四半期を求める（1〜12）。
    pub fn for_month(month: u32) -> Self {
        Self::from_number((month.clamp(1, 12) - 1) / 3 + 1).unwrap_or(Quarter::Q1)
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.number())
    }
}

/// サーバー側の取り込みジョブの状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// 解析・照合・集計の途中。
    Processing,
    /// 正常完了（集計詳細が取得可能）。
    Completed,
    /// 失敗（error_logに理由）。
    Failed,
}

impl ReportStatus {
    /// ポーリングを止めるべき状態か。
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }
}

/// 1四半期分の取り込みジョブ（サーバーの鏡像）。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub quarter: Quarter,
    pub year: i32,
    #[serde(default)]
    pub quarter_key: Option<String>,
    pub status: ReportStatus,
    /// 0〜100の進捗。クライアントは表示するだけで書き換えない。
    #[serde(default)]
    pub processing_progress: u8,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub processed_files: u64,
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub matched_tracks: u64,
    #[serde(default)]
    pub unmatched_tracks: u64,
    #[serde(default)]
    pub total_revenue: f64,
    #[serde(default)]
    pub total_streams: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub error_log: Option<String>,
    /// 任意の表示名（リネームで設定）。
    #[serde(default)]
    pub notes: Option<String>,
}

impl Report {
    /// 期間ラベル（例: "Q1 2025"）。
    pub fn period(&self) -> String {
        format!("{} {}", self.quarter, self.year)
    }

    /// 一覧に出す名前：表示名があればそれ、無ければ期間。
    pub fn display_name(&self) -> String {
        match self.notes.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => self.period(),
        }
    }

    /// リネーム入力欄の初期値。
    pub fn rename_default(&self) -> String {
        self.display_name()
    }
}

/// 一覧を新しい順（created_at降順）に並べ替える。
pub fn sort_most_recent_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// 完了レポートの集計詳細。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportDetails {
    pub releases: Vec<ReleaseSummary>,
    pub platforms: Vec<BreakdownRow>,
    pub countries: Vec<BreakdownRow>,
    pub payouts: Vec<Payout>,
}

impl ReportDetails {
    /// 全アーティストへの支払総額。
    pub fn payout_total(&self) -> f64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    /// カタログと照合できたリリース数。
    pub fn matched_releases(&self) -> usize {
        self.releases.iter().filter(|r| r.is_matched).count()
    }
}

/// 収益の多い順に先頭n件を返す。
pub fn top_by_revenue(rows: &[BreakdownRow], n: usize) -> Vec<&BreakdownRow> {
    let mut sorted: Vec<&BreakdownRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    sorted.truncate(n);
    sorted
}

/// リリース単位の集計。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    pub release_id: Option<String>,
    pub release_type: Option<String>,
    pub release_title: String,
    pub artist_name: String,
    pub is_matched: bool,
    pub total_streams: u64,
    pub total_revenue: f64,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub tracks: Vec<TrackSummary>,
}

/// トラック単位の集計。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub track_title: String,
    pub streams: u64,
    pub revenue: f64,
    pub isrc: Option<String>,
}

/// プラットフォーム別・国別の1行。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub name: String,
    pub streams: u64,
    pub revenue: f64,
}

/// ユーザーごとの支払い。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub user_id: String,
    pub artist_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub amount: f64,
    pub status: String,
}

impl Payout {
    /// 支払状態の表示ラベル。
    pub fn status_label(&self) -> &str {
        if self.status == "credited" {
            "Credited"
        } else {
            &self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_json(notes: serde_json::Value, created_at: &str) -> serde_json::Value {
        serde_json::json!({
            "id": Uuid::new_v4(),
            "quarter": "Q3",
            "year": 2024,
            "quarter_key": "Q3_2024",
            "status": "processing",
            "processing_progress": 40,
            "total_files": 2,
            "processed_files": 1,
            "total_rows": 1200,
            "matched_tracks": 10,
            "unmatched_tracks": 2,
            "total_revenue": 1234.5,
            "total_streams": 50000,
            "created_at": created_at,
            "error_log": null,
            "notes": notes
        })
    }

    #[test]
    fn test_report_deserializes_server_shape() {
        // サーバーのJSON形状をそのまま読めることを確認する。
        let r: Report =
            serde_json::from_value(report_json(serde_json::Value::Null, "2025-01-10T12:00:00Z"))
                .unwrap();
        assert_eq!(r.quarter, Quarter::Q3);
        assert_eq!(r.status, ReportStatus::Processing);
        assert_eq!(r.processing_progress, 40);
        assert_eq!(r.display_name(), "Q3 2024");
    }

    #[test]
    fn test_display_name_prefers_notes() {
        // 表示名があればそれを優先し、空白のみなら期間に戻す。
        let r: Report = serde_json::from_value(report_json(
            serde_json::json!("Summer batch"),
            "2025-01-10T12:00:00Z",
        ))
        .unwrap();
        assert_eq!(r.display_name(), "Summer batch");

        let blank: Report =
            serde_json::from_value(report_json(serde_json::json!("  "), "2025-01-10T12:00:00Z"))
                .unwrap();
        assert_eq!(blank.display_name(), "Q3 2024");
    }

    #[test]
    fn test_sort_most_recent_first() {
        // created_at降順に並ぶことを確認する。
        let mut v: Vec<Report> = ["2024-01-01T00:00:00Z", "2025-06-01T00:00:00Z", "2024-09-01T00:00:00Z"]
            .iter()
            .map(|ts| serde_json::from_value(report_json(serde_json::Value::Null, ts)).unwrap())
            .collect();
        sort_most_recent_first(&mut v);
        let years: Vec<i32> = v.iter().map(|r| r.created_at.format("%Y%m").to_string().parse().unwrap()).collect();
        assert_eq!(years, vec![202506, 202409, 202401]);
    }

    #[test]
    fn test_quarter_helpers() {
        // 番号変換と巡回を確認する。
        assert_eq!(Quarter::from_number(3), Some(Quarter::Q3));
        assert_eq!(Quarter::from_number(5), None);
        assert_eq!(Quarter::Q4.next(), Quarter::Q1);
        assert_eq!(Quarter::for_month(11), Quarter::Q4);
        assert_eq!(Quarter::for_month(1), Quarter::Q1);
        assert!(Quarter::Q1 < Quarter::Q2);
    }

    #[test]
    fn test_details_camel_case_and_totals() {
        // 詳細JSON（camelCase）の読み込みと合計計算。
        let d: ReportDetails = serde_json::from_value(serde_json::json!({
            "releases": [{
                "releaseId": "r1", "releaseType": "single", "releaseTitle": "Night",
                "artistName": "Echo", "isMatched": true, "totalStreams": 900,
                "totalRevenue": 12.5, "coverUrl": null,
                "tracks": [
                    {"trackTitle": "A", "streams": 1, "revenue": 0.1, "isrc": null},
                    {"trackTitle": "B", "streams": 1, "revenue": 0.1, "isrc": null},
                    {"trackTitle": "C", "streams": 1, "revenue": 0.1, "isrc": "RU1"}
                ]
            }],
            "platforms": [{"name": "Spotify", "streams": 900, "revenue": 12.5}],
            "payouts": [
                {"userId": "u1", "artistName": "Echo", "email": "e@x", "avatarUrl": null, "amount": 10.0, "status": "credited"},
                {"userId": "u2", "artistName": "Delta", "email": "d@x", "avatarUrl": null, "amount": 2.5, "status": "pending"}
            ]
        }))
        .unwrap();
        assert!(d.countries.is_empty());
        assert_eq!(d.payout_total(), 12.5);
        assert_eq!(d.matched_releases(), 1);
        assert_eq!(d.releases[0].tracks[2].isrc.as_deref(), Some("RU1"));
        assert_eq!(d.payouts[0].status_label(), "Credited");
        assert_eq!(d.payouts[1].status_label(), "pending");
    }

    #[test]
    fn test_top_by_revenue() {
        // 収益降順で上位のみ残る。
        let rows: Vec<BreakdownRow> = (1..=8)
            .map(|i| BreakdownRow {
                name: format!("p{i}"),
                streams: i,
                revenue: i as f64,
            })
            .collect();
        let top = top_by_revenue(&rows, 6);
        assert_eq!(top.len(), 6);
        assert_eq!(top[0].name, "p8");
        assert_eq!(top[5].name, "p3");
        assert!(top_by_revenue(&[], 6).is_empty());
    }
}
