//! Display helpers for counters, money, countries and platforms.
//!
//! All functions are pure lookups or arithmetic and never fail.

/// Abbreviate a counter: `2500` -> `2.5K`, `1500000` -> `1.5M`.
pub fn format_number(num: u64) -> String {
    if num >= 1_000_000 {
        format!("{:.1}M", num as f64 / 1_000_000.0)
    } else if num >= 1_000 {
        format!("{:.1}K", num as f64 / 1_000.0)
    } else {
        format_grouped(num)
    }
}

/// Group thousands with spaces: `1234567` -> `1 234 567`.
pub fn format_grouped(num: u64) -> String {
    group_digits(&num.to_string())
}

/// Russian rouble formatting: `1234.5` -> `1 234,50 ₽`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!(
        "{}{},{:02} ₽",
        sign,
        group_digits(&(cents / 100).to_string()),
        cents % 100
    )
}

fn group_digits(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Russian plural of "track" for a count.
pub fn tracks_noun(count: usize) -> &'static str {
    match count {
        1 => "трек",
        2..=4 => "трека",
        _ => "треков",
    }
}

const GLOBE: &str = "🌍";

// Country names as the distributors spell them: English, ISO code, Russian.
const COUNTRY_FLAGS: &[(&[&str], &str)] = &[
    (&["Russia", "Russian Federation", "RU", "Россия"], "🇷🇺"),
    (&["Ukraine", "UA", "Украина"], "🇺🇦"),
    (&["Kazakhstan", "KZ", "Казахстан"], "🇰🇿"),
    (&["Belarus", "BY", "Беларусь"], "🇧🇾"),
    (&["Uzbekistan", "UZ", "Узбекистан"], "🇺🇿"),
    (&["Kyrgyzstan", "KG", "Кыргызстан"], "🇰🇬"),
    (&["Azerbaijan", "AZ", "Азербайджан"], "🇦🇿"),
    (&["Armenia", "AM", "Армения"], "🇦🇲"),
    (&["Georgia", "GE", "Грузия"], "🇬🇪"),
    (&["Moldova", "MD", "Молдова"], "🇲🇩"),
    (&["Tajikistan", "TJ", "Таджикистан"], "🇹🇯"),
    (&["Turkmenistan", "TM", "Туркменистан"], "🇹🇲"),
    (&["United States", "US", "USA", "США"], "🇺🇸"),
    (&["Germany", "DE", "Германия"], "🇩🇪"),
    (&["France", "FR", "Франция"], "🇫🇷"),
    (&["United Kingdom", "UK", "GB", "Великобритания"], "🇬🇧"),
    (&["Italy", "IT", "Италия"], "🇮🇹"),
    (&["Spain", "ES", "Испания"], "🇪🇸"),
    (&["Netherlands", "NL", "Нидерланды"], "🇳🇱"),
    (&["Belgium", "BE", "Бельгия"], "🇧🇪"),
    (&["Austria", "AT", "Австрия"], "🇦🇹"),
    (&["Switzerland", "CH", "Швейцария"], "🇨🇭"),
    (&["Sweden", "SE", "Швеция"], "🇸🇪"),
    (&["Norway", "NO", "Норвегия"], "🇳🇴"),
    (&["Denmark", "DK", "Дания"], "🇩🇰"),
    (&["Finland", "FI", "Финляндия"], "🇫🇮"),
    (&["Poland", "PL", "Польша"], "🇵🇱"),
    (&["Czech Republic", "CZ", "Чехия"], "🇨🇿"),
    (&["Hungary", "HU", "Венгрия"], "🇭🇺"),
    (&["Romania", "RO", "Румыния"], "🇷🇴"),
    (&["Bulgaria", "BG", "Болгария"], "🇧🇬"),
    (&["Greece", "GR", "Греция"], "🇬🇷"),
    (&["Portugal", "PT", "Португалия"], "🇵🇹"),
    (&["Ireland", "IE", "Ирландия"], "🇮🇪"),
    (&["Turkey", "TR", "Турция"], "🇹🇷"),
    (&["Japan", "JP", "Япония"], "🇯🇵"),
    (&["China", "CN", "Китай"], "🇨🇳"),
    (&["South Korea", "KR", "Южная Корея"], "🇰🇷"),
    (&["India", "IN", "Индия"], "🇮🇳"),
    (&["Thailand", "TH", "Таиланд"], "🇹🇭"),
    (&["Vietnam", "VN", "Вьетнам"], "🇻🇳"),
    (&["Indonesia", "ID", "Индонезия"], "🇮🇩"),
    (&["Malaysia", "MY", "Малайзия"], "🇲🇾"),
    (&["Philippines", "PH", "Филиппины"], "🇵🇭"),
    (&["Singapore", "SG", "Сингапур"], "🇸🇬"),
    (&["Israel", "IL", "Израиль"], "🇮🇱"),
    (&["UAE", "AE", "United Arab Emirates", "ОАЭ"], "🇦🇪"),
    (&["Saudi Arabia", "SA", "Саудовская Аравия"], "🇸🇦"),
    (&["Canada", "CA", "Канада"], "🇨🇦"),
    (&["Mexico", "MX", "Мексика"], "🇲🇽"),
    (&["Brazil", "BR", "Бразилия"], "🇧🇷"),
    (&["Argentina", "AR", "Аргентина"], "🇦🇷"),
    (&["Chile", "CL", "Чили"], "🇨🇱"),
    (&["Colombia", "CO", "Колумбия"], "🇨🇴"),
    (&["Peru", "PE", "Перу"], "🇵🇪"),
    (&["Australia", "AU", "Австралия"], "🇦🇺"),
    (&["New Zealand", "NZ", "Новая Зеландия"], "🇳🇿"),
    (&["South Africa", "ZA", "ЮАР"], "🇿🇦"),
    (&["Egypt", "EG", "Египет"], "🇪🇬"),
    (&["Nigeria", "NG", "Нигерия"], "🇳🇬"),
    (&["Morocco", "MA", "Марокко"], "🇲🇦"),
];

/// Flag emoji for a country name or ISO code; the globe for anything unknown.
pub fn country_flag(country: &str) -> &'static str {
    COUNTRY_FLAGS
        .iter()
        .find(|(names, _)| names.contains(&country))
        .map(|(_, flag)| *flag)
        .unwrap_or(GLOBE)
}

/// Default colour for platforms without a known brand.
pub const DEFAULT_PLATFORM_COLOR: &str = "#A855F7";

// Checked in order; the first substring hit wins.
const PLATFORM_COLORS: &[(&[&str], &str)] = &[
    (&["spotify"], "#1DB954"),
    (&["apple"], "#FC3C44"),
    (&["yandex", "яндекс"], "#FC3F1D"),
    (&["vk", "uma", "boom"], "#0077FF"),
    (&["youtube"], "#FF0000"),
    (&["deezer"], "#FEAA2D"),
    (&["tiktok"], "#00F2EA"),
    (&["soundcloud"], "#FF5500"),
    (&["amazon"], "#FF9900"),
    (&["tidal"], "#000000"),
];

/// Brand colour (`#RRGGBB`) for a platform name, matched case-insensitively.
pub fn platform_color(platform: &str) -> &'static str {
    let p = platform.to_lowercase();
    PLATFORM_COLORS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| p.contains(n)))
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_PLATFORM_COLOR)
}

/// Split a `#RRGGBB` colour into its components.
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let h = hex.strip_prefix('#')?;
    if h.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&h[0..2], 16).ok()?;
    let g = u8::from_str_radix(&h[2..4], 16).ok()?;
    let b = u8::from_str_radix(&h[4..6], 16).ok()?;
    Some((r, g, b))
}
