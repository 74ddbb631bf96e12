//! Stateless helpers shared by the builder, paginator, merge engine and verifier.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::conf::{
    C_LABEL_CARRIED_FORWARD, C_LABEL_HEADER_CAMPAIGN, C_LABEL_SUBTOTAL, C_LABEL_TOTAL_PREFIX,
    L_MARKET_CODES, N_COL_METRIC,
};
use crate::spec::{
    EnumFillClass, EnumMediaType, EnumRowKind, EnumTileCategory, SpecCanonicalRecord,
};

static RE_MONTHLY_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"MONTHLY.*TOTAL").expect("Invalid monthly total regex"));
static RE_GRAND_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"GRAND.*TOTAL").expect("Invalid grand total regex"));
static RE_BRAND_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"BRAND.*TOTAL").expect("Invalid brand total regex"));
static RE_WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

////////////////////////////////////////////////////////////////////////////////
// #region LabelNormalization

/// Fold non-breaking spaces and typographic dashes to ASCII.
pub fn fold_non_breaking(text: &str) -> String {
    text.chars()
        .map(|chr| match chr {
            '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{2009}' => ' ',
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => '-',
            _ => chr,
        })
        .collect()
}

/// Collapse whitespace runs to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text.trim(), " ").to_string()
}

/// Classifier form of a label: first line only, ASCII-folded, upper-case.
pub fn normalize_label(raw: &str) -> String {
    let c_folded = fold_non_breaking(raw);
    let c_first_line = c_folded.lines().next().unwrap_or("");
    collapse_whitespace(c_first_line).to_uppercase()
}

/// `true` for `MONTHLY ... TOTAL` labels.
pub fn is_monthly_total_label(label_norm: &str) -> bool {
    RE_MONTHLY_TOTAL.is_match(label_norm)
}

/// `true` for `GRAND ... TOTAL` / `BRAND ... TOTAL` labels.
pub fn is_grand_total_label(label_norm: &str) -> bool {
    RE_GRAND_TOTAL.is_match(label_norm) || RE_BRAND_TOTAL.is_match(label_norm)
}

/// `true` for any boundary-row label of the row vocabulary.
pub fn is_total_label(label_norm: &str) -> bool {
    is_monthly_total_label(label_norm)
        || is_grand_total_label(label_norm)
        || label_norm.starts_with(C_LABEL_TOTAL_PREFIX)
        || label_norm.starts_with(C_LABEL_SUBTOTAL)
        || label_norm.starts_with(C_LABEL_CARRIED_FORWARD)
}

/// Campaign name carried by a column-0 cell.
///
/// `"MONTHLY TOTAL (...)\nName"` yields `NAME`; other multi-line text is joined.
pub fn derive_campaign_name(raw: &str) -> String {
    let c_folded = fold_non_breaking(raw);
    let l_lines: Vec<&str> = c_folded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let Some(c_first) = l_lines.first() else {
        return String::new();
    };
    let l_name_lines = if is_total_label(&normalize_label(c_first)) {
        &l_lines[1..]
    } else {
        &l_lines[..]
    };
    // a line ending in '-' was broken at a hyphen; rejoin without a space
    let mut c_joined = String::new();
    for c_line in l_name_lines {
        if !c_joined.is_empty() && !c_joined.ends_with('-') {
            c_joined.push(' ');
        }
        c_joined.push_str(c_line);
    }
    collapse_whitespace(&c_joined).to_uppercase()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowClassification

/// Map `#RRGGBB` to white/gray/other.
pub fn derive_fill_class(color: &str) -> EnumFillClass {
    let c_hex = color.trim().trim_start_matches('#');
    if c_hex.is_empty() {
        return EnumFillClass::White;
    }
    if c_hex.len() != 6 || !c_hex.chars().all(|chr| chr.is_ascii_hexdigit()) {
        return EnumFillClass::Other;
    }
    let parse_channel = |n_start: usize| u8::from_str_radix(&c_hex[n_start..n_start + 2], 16).ok();
    let (Some(n_r), Some(n_g), Some(n_b)) = (parse_channel(0), parse_channel(2), parse_channel(4))
    else {
        return EnumFillClass::Other;
    };
    let n_max = n_r.max(n_g).max(n_b);
    let n_min = n_r.min(n_g).min(n_b);
    if n_min >= 0xF8 {
        return EnumFillClass::White;
    }
    if n_max - n_min <= 0x10 && n_max >= 0x80 {
        return EnumFillClass::Gray;
    }
    EnumFillClass::Other
}

/// `true` when the metric column names a television sub-metric.
pub fn is_metric_sub_label(text: &str) -> bool {
    let c_norm = normalize_label(text);
    c_norm.starts_with("GRP") || c_norm.starts_with("REACH") || c_norm.starts_with("OTS")
}

/// Derive a row kind from its cell texts and fill class.
///
/// The single classification point for rows that arrive without a kind.
pub fn classify_row_kind(texts: &[&str], fill_class: EnumFillClass) -> EnumRowKind {
    let c_label = normalize_label(texts.first().copied().unwrap_or(""));
    if fill_class == EnumFillClass::Gray {
        if is_grand_total_label(&c_label) {
            return EnumRowKind::GrandTotal;
        }
        if is_monthly_total_label(&c_label) {
            return EnumRowKind::MonthlyTotal;
        }
        if c_label.starts_with(C_LABEL_CARRIED_FORWARD) {
            return EnumRowKind::CarriedForward;
        }
        if c_label.starts_with(C_LABEL_SUBTOTAL) || c_label.starts_with(C_LABEL_TOTAL_PREFIX) {
            return EnumRowKind::Subtotal;
        }
    } else if c_label == C_LABEL_HEADER_CAMPAIGN {
        return EnumRowKind::Header;
    }
    if texts
        .get(N_COL_METRIC)
        .is_some_and(|text| is_metric_sub_label(text))
    {
        return EnumRowKind::MetricSub;
    }
    EnumRowKind::CampaignMedia
}

/// Media channel named by a media-column cell (case-insensitive substring).
pub fn match_media_token(text: &str) -> Option<EnumMediaType> {
    let c_norm = normalize_label(text);
    if c_norm.is_empty() {
        return None;
    }
    EnumMediaType::ALL
        .into_iter()
        .find(|media| c_norm.contains(media.token()))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SmartLineBreak

/// Break a campaign name over at most two lines.
///
/// - `A-B` (exactly two hyphen-joined tokens) splits at the hyphen.
/// - Other hyphens become spaces.
/// - 1 word stays; 2 words one per line; 3 words 2+1; 4+ words balanced, first line rounded up.
pub fn format_smart_line_break(name: &str) -> String {
    let c_name = collapse_whitespace(name);
    let l_hyphen_parts: Vec<&str> = c_name.split('-').collect();
    if !c_name.contains(' ')
        && l_hyphen_parts.len() == 2
        && l_hyphen_parts.iter().all(|part| !part.is_empty())
    {
        return format!("{}-\n{}", l_hyphen_parts[0], l_hyphen_parts[1]);
    }

    let c_spaced = c_name.replace('-', " ");
    let l_words: Vec<&str> = c_spaced.split_whitespace().collect();
    match l_words.len() {
        0 => String::new(),
        1 => l_words[0].to_string(),
        n_words => {
            let n_first = if n_words == 3 { 2 } else { n_words.div_ceil(2) };
            format!(
                "{}\n{}",
                l_words[..n_first].join(" "),
                l_words[n_first..].join(" ")
            )
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region NumberFormatting

/// Group an integer with thousands separators (`-1234567` -> `-1,234,567`).
pub fn format_grouped_integer(value: f64) -> String {
    let n_rounded = value.round() as i64;
    let c_digits = n_rounded.unsigned_abs().to_string();
    let mut c_grouped = String::with_capacity(c_digits.len() + c_digits.len() / 3);
    for (n_idx, chr) in c_digits.chars().enumerate() {
        if n_idx > 0 && (c_digits.len() - n_idx) % 3 == 0 {
            c_grouped.push(',');
        }
        c_grouped.push(chr);
    }
    if n_rounded < 0 {
        format!("-{c_grouped}")
    } else {
        c_grouped
    }
}

/// Cost cell text in thousands (`£ 000` unit).
pub fn format_cost_thousands(value: f64) -> String {
    format_grouped_integer(value / 1_000.0)
}

/// Metric cell text with one decimal.
pub fn format_metric(value: f64) -> String {
    // `+ 0.0` folds negative zero
    format!("{:.1}", value + 0.0)
}

/// Percentage text with one decimal; `share_pct` is already in percent.
pub fn format_percent(share_pct: f64) -> String {
    format!("{:.1}%", share_pct + 0.0)
}

/// Magnitude suffix for a tile display scale.
pub fn derive_scale_suffix(scale: f64) -> &'static str {
    if (scale - 1_000.0).abs() < f64::EPSILON {
        "K"
    } else if (scale - 1_000_000.0).abs() < f64::EPSILON {
        "M"
    } else {
        ""
    }
}

/// Tile text: `Q1: £300K` for budgets, `Television: 45.0%` for shares.
pub fn format_tile_text(
    category: EnumTileCategory,
    label: &str,
    value: f64,
    scale: f64,
    currency_symbol: &str,
) -> String {
    match category {
        EnumTileCategory::QuarterBudget => {
            let n_scale = if scale > 0.0 { scale } else { 1.0 };
            format!(
                "{label}: {currency_symbol}{}{}",
                format_grouped_integer(value / n_scale),
                derive_scale_suffix(n_scale)
            )
        }
        EnumTileCategory::MediaShare | EnumTileCategory::FunnelShare => {
            format!("{label}: {}", format_percent(value))
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordSelection

/// Comparison key for a market: codes resolve to display names, case-folded.
pub fn normalize_market(name: &str) -> String {
    let c_name = collapse_whitespace(&fold_non_breaking(name));
    let c_upper = c_name.to_uppercase();
    L_MARKET_CODES
        .iter()
        .find(|(c_code, _)| *c_code == c_upper)
        .map_or(c_name, |(_, c_display)| c_display.to_string())
        .to_lowercase()
}

/// Comparison key for a brand.
pub fn normalize_brand(name: &str) -> String {
    collapse_whitespace(&fold_non_breaking(name)).to_lowercase()
}

/// Records of one (market, brand[, year]) after name normalization.
pub fn select_records_for_key<'a>(
    records: &'a [SpecCanonicalRecord],
    market: &str,
    brand: &str,
    year: Option<i32>,
) -> Vec<&'a SpecCanonicalRecord> {
    let c_market = normalize_market(market);
    let c_brand = normalize_brand(brand);
    records
        .iter()
        .filter(|rec| {
            normalize_market(&rec.market) == c_market
                && normalize_brand(&rec.brand) == c_brand
                && year.is_none_or(|n_year| rec.year == n_year)
        })
        .collect()
}

/// Distinct `(market, brand, year)` triples, sorted case-insensitively.
///
/// The first spelling seen for a normalized market/brand is kept for display.
pub fn derive_report_keys(records: &[SpecCanonicalRecord]) -> Vec<(String, String, i32)> {
    let mut set_seen = BTreeSet::new();
    let mut l_keys = Vec::new();
    for rec in records {
        let tup_key = (normalize_market(&rec.market), normalize_brand(&rec.brand), rec.year);
        if set_seen.insert(tup_key.clone()) {
            l_keys.push((tup_key, (rec.market.trim().to_string(), rec.brand.trim().to_string())));
        }
    }
    l_keys.sort_by(|(tup_a, _), (tup_b, _)| tup_a.cmp(tup_b));
    l_keys
        .into_iter()
        .map(|((_, _, n_year), (c_market, c_brand))| (c_market, c_brand, n_year))
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNames

/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;

/// Replace invalid chars and trim to a valid sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Slide".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_label_takes_first_line_and_folds() {
        assert_eq!(normalize_label("Monthly\u{00A0}Total (£ 000)\nAlpha"), "MONTHLY TOTAL (£ 000)");
        assert_eq!(normalize_label("  total \u{2013} slide 1 "), "TOTAL - SLIDE 1");
        assert_eq!(normalize_label(""), "");
    }

    #[test]
    fn test_derive_campaign_name_reads_second_line_after_total_label() {
        assert_eq!(derive_campaign_name("MONTHLY TOTAL (£ 000)\nSpring Launch"), "SPRING LAUNCH");
        assert_eq!(derive_campaign_name("SPRING\nLAUNCH"), "SPRING LAUNCH");
        assert_eq!(derive_campaign_name("AUTUMN-\nPUSH"), "AUTUMN-PUSH");
        assert_eq!(derive_campaign_name("Campaign A"), "CAMPAIGN A");
        assert_eq!(derive_campaign_name("  "), "");
    }

    #[test]
    fn test_fill_class() {
        assert_eq!(derive_fill_class("#FFFFFF"), EnumFillClass::White);
        assert_eq!(derive_fill_class(""), EnumFillClass::White);
        assert_eq!(derive_fill_class("#D9D9D9"), EnumFillClass::Gray);
        assert_eq!(derive_fill_class("#BFBFBF"), EnumFillClass::Gray);
        assert_eq!(derive_fill_class("#1F3864"), EnumFillClass::Other);
        assert_eq!(derive_fill_class("not-a-color"), EnumFillClass::Other);
        assert_eq!(derive_fill_class("#€abc"), EnumFillClass::Other);
        assert_eq!(derive_fill_class("#+1+1+1"), EnumFillClass::Other);
    }

    #[test]
    fn test_classify_row_kind_uses_label_and_fill() {
        let gray = EnumFillClass::Gray;
        let white = EnumFillClass::White;
        assert_eq!(classify_row_kind(&["MONTHLY TOTAL (£ 000)"], gray), EnumRowKind::MonthlyTotal);
        assert_eq!(classify_row_kind(&["MONTHLY TOTAL (£ 000)"], white), EnumRowKind::CampaignMedia);
        assert_eq!(classify_row_kind(&["GRAND TOTAL"], gray), EnumRowKind::GrandTotal);
        assert_eq!(classify_row_kind(&["Brand Total"], gray), EnumRowKind::GrandTotal);
        assert_eq!(classify_row_kind(&["TOTAL - SLIDE 1"], gray), EnumRowKind::Subtotal);
        assert_eq!(classify_row_kind(&["SUBTOTAL - SLIDE 2"], gray), EnumRowKind::Subtotal);
        assert_eq!(classify_row_kind(&["CARRIED FORWARD"], gray), EnumRowKind::CarriedForward);
        assert_eq!(
            classify_row_kind(&["Campaign", "Media"], EnumFillClass::Other),
            EnumRowKind::Header
        );
        assert_eq!(classify_row_kind(&["", "", "GRPs"], white), EnumRowKind::MetricSub);
        assert_eq!(classify_row_kind(&["Alpha", "Television", "£ 000"], white), EnumRowKind::CampaignMedia);
    }

    #[test]
    fn test_match_media_token() {
        assert_eq!(match_media_token("Television"), Some(EnumMediaType::Television));
        assert_eq!(match_media_token("digital video"), Some(EnumMediaType::Digital));
        assert_eq!(match_media_token("OOH"), Some(EnumMediaType::Ooh));
        assert_eq!(match_media_token(""), None);
        assert_eq!(match_media_token("£ 000"), None);
    }

    #[test]
    fn test_smart_line_break_cases() {
        assert_eq!(format_smart_line_break("Alpha"), "Alpha");
        assert_eq!(format_smart_line_break("Spring Launch"), "Spring\nLaunch");
        assert_eq!(format_smart_line_break("Spring-Launch"), "Spring-\nLaunch");
        assert_eq!(format_smart_line_break("Big Spring Launch"), "Big Spring\nLaunch");
        assert_eq!(format_smart_line_break("Big-Spring-Launch"), "Big Spring\nLaunch");
        assert_eq!(format_smart_line_break("A B C D E"), "A B C\nD E");
        assert_eq!(format_smart_line_break("A B C D"), "A B\nC D");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_grouped_integer(1_234_567.4), "1,234,567");
        assert_eq!(format_grouped_integer(-1_234.0), "-1,234");
        assert_eq!(format_grouped_integer(999.0), "999");
        assert_eq!(format_cost_thousands(1_000.0), "1");
        assert_eq!(format_cost_thousands(2_500_000.0), "2,500");
        assert_eq!(
            format_tile_text(EnumTileCategory::QuarterBudget, "Q1", 300_000.0, 1_000.0, "£"),
            "Q1: £300K"
        );
        assert_eq!(
            format_tile_text(EnumTileCategory::MediaShare, "Television", 45.0, 1.0, "£"),
            "Television: 45.0%"
        );
        assert_eq!(format_percent(-0.0), "0.0%");
        assert_eq!(format_metric(-0.0), "0.0");
    }

    #[test]
    fn test_market_normalization_resolves_codes() {
        assert_eq!(normalize_market("GBR"), "united kingdom");
        assert_eq!(normalize_market(" United  Kingdom "), "united kingdom");
        assert_eq!(normalize_market("Narnia"), "narnia");
        assert_eq!(normalize_brand("  Acme\u{00A0}Cola "), "acme cola");
    }

    #[test]
    fn test_report_keys_are_distinct_and_sorted() {
        let rec = |market: &str, brand: &str, year: i32| SpecCanonicalRecord {
            market: market.to_string(),
            brand: brand.to_string(),
            year,
            ..Default::default()
        };
        let l_records = vec![
            rec("UK", "Zest", 2024),
            rec("United Kingdom", "zest", 2024),
            rec("France", "Acme", 2025),
            rec("France", "Acme", 2024),
        ];
        assert_eq!(
            derive_report_keys(&l_records),
            vec![
                ("France".to_string(), "Acme".to_string(), 2024),
                ("France".to_string(), "Acme".to_string(), 2025),
                ("UK".to_string(), "Zest".to_string(), 2024),
            ]
        );
        assert_eq!(select_records_for_key(&l_records, "GBR", "ZEST", Some(2024)).len(), 2);
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("UK - Acme (1/2)", "_"), "UK - Acme (1_2)");
        assert_eq!(sanitize_sheet_name("   ", "_"), "Slide");
    }

    proptest! {
        #[test]
        fn prop_single_word_names_are_unchanged(word in "[A-Za-z0-9]{1,12}") {
            prop_assert_eq!(format_smart_line_break(&word), word);
        }

        #[test]
        fn prop_two_word_names_give_two_lines(a in "[A-Za-z]{1,10}", b in "[A-Za-z]{1,10}") {
            let c_out = format_smart_line_break(&format!("{a} {b}"));
            prop_assert_eq!(c_out.lines().count(), 2);
        }

        #[test]
        fn prop_single_hyphen_splits_at_hyphen(a in "[A-Za-z]{1,10}", b in "[A-Za-z]{1,10}") {
            let c_out = format_smart_line_break(&format!("{a}-{b}"));
            prop_assert_eq!(c_out, format!("{a}-\n{b}"));
        }
    }
}
