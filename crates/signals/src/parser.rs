//! Free-text signal extraction.
//!
//! Alerts arrive as loosely formatted chat messages: labeled sections
//! (`Entry:`, `TP:`, `SL:`), numbered target lists, DCA lines, price ranges,
//! inline symbols (`BTC/USDT`, `BTCUSDT`). The parser scans the text for
//! label occurrences, attributes the text between consecutive labels to the
//! preceding one, then extracts price levels from each section.
//!
//! Parsing never fails: text that does not yield both a symbol and a side
//! produces no signal, which callers treat as "not an alert".

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use trade_relay_core::signal::{Side, Signal};

/// Section label alternation, longest phrases first so multi-word labels win
/// over their prefixes (`stop loss` before `stop`).
const LABEL_ALTS: &str = "current[\\s\\-]*market[\\s\\-]*price|take[\\s\\-]*profits?\
|profit[\\s\\-]*targets?|stop[\\s\\-]*loss(?:es)?|stop[\\s\\-]*price\
|entry[\\s\\-]*zones?|entry[\\s\\-]*prices?|entry[\\s\\-]*ranges?\
|buy[\\s\\-]*zones?|buy[\\s\\-]*area|entries|entry|targets?|leverage\
|analysis|comments?|notes?|dca\\d*|cmp|lev|risk|tp\\d*|sl\\d*|stop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Entry,
    TakeProfit,
    StopLoss,
    /// Recognized as a section boundary but contributes no price levels
    /// (leverage, risk, notes, ...).
    Boundary,
}

#[derive(Debug)]
struct LabelHit {
    label_start: usize,
    content_start: usize,
    kind: SectionKind,
}

/// Stateless text-to-signal extractor. Regexes are compiled once in the
/// constructor; the parser is `Send + Sync` and can be shared freely.
pub struct SignalParser {
    label_sep: Regex,
    label_line: Regex,
    side: Regex,
    leverage_labeled: Regex,
    leverage_inline: Regex,
    symbol_labeled: Regex,
    symbol_slash: Regex,
    symbol_dash: Regex,
    symbol_fused: Regex,
    quote_suffix_joined: Regex,
    quote_suffix_fused: Regex,
    at_form: Regex,
    range_form: Regex,
    cmp_word: Regex,
    numbered_paren_prefix: Regex,
    numbered_dot_prefix: Regex,
    dca_prefix: Regex,
    entry_prefix: Regex,
    section_prefix: Regex,
    thousands: Regex,
    dash_range: Regex,
    number: Regex,
}

impl Default for SignalParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalParser {
    /// Compiles the parser's pattern set.
    ///
    /// # Panics
    /// Panics if a built-in pattern fails to compile, which would be a bug.
    #[must_use]
    pub fn new() -> Self {
        let label_sep = Regex::new(&format!(
            r"(?i)\b(?P<label>{LABEL_ALTS})\b\s*\d*\s*[:\-]\s*"
        ))
        .expect("label pattern");
        // Digits before the colon ("TP 1:") are only consumed when the colon
        // follows; a bare "Entry 60000" line must keep its number as content.
        let label_line = Regex::new(&format!(
            r"(?im)^[ \t]*(?P<label>{LABEL_ALTS})\b[ \t]*(?:\d+[ \t]*:|:)?[ \t]*"
        ))
        .expect("line label pattern");

        Self {
            label_sep,
            label_line,
            side: Regex::new(r"(?i)\b(long|short|buy|sell)\b").expect("side pattern"),
            leverage_labeled: Regex::new(r"(?i)\b(?:leverage|lev)\s*:?\s*(\d+)\s*x?\b")
                .expect("leverage pattern"),
            leverage_inline: Regex::new(r"(?i)\b(\d+)x\b").expect("inline leverage pattern"),
            symbol_labeled: Regex::new(r"(?i)\b(?:symbol|pair)\s*:?\s*([A-Z0-9/\-]+)")
                .expect("labeled symbol pattern"),
            symbol_slash: Regex::new(r"(?i)\b([A-Z0-9]{1,10}/USDT?)\b").expect("slash symbol"),
            symbol_dash: Regex::new(r"(?i)\b([A-Z0-9]{1,10}-USDT?)\b").expect("dash symbol"),
            symbol_fused: Regex::new(r"(?i)\b([A-Z0-9]{2,10}USDT?)\b").expect("fused symbol"),
            quote_suffix_joined: Regex::new(r"(?i)[/\-](USDT|USD|PERP)$").expect("quote suffix"),
            quote_suffix_fused: Regex::new(r"(?i)(USDT|USD|PERP)$").expect("fused quote suffix"),
            at_form: Regex::new(r"(?i)\b(long|short)\s+([A-Z0-9/\-]+)\s*@\s*(\d+(?:\.\d+)?)")
                .expect("at-form pattern"),
            range_form: Regex::new(
                r"(?i)\b(buy|sell)\s+([A-Z0-9/\-]+)\s+(\d+(?:\.\d+)?)[-–](\d+(?:\.\d+)?)",
            )
            .expect("range-form pattern"),
            cmp_word: Regex::new(r"(?i)\bcmp\b").expect("cmp pattern"),
            numbered_paren_prefix: Regex::new(r"^\d+\s*[):]\s*").expect("numbered prefix"),
            numbered_dot_prefix: Regex::new(r"^\d+\s*\.\s+").expect("numbered dot prefix"),
            dca_prefix: Regex::new(r"(?i)dca\d*\s*:\s*").expect("dca prefix"),
            entry_prefix: Regex::new(r"(?i)^entry\s*:\s*").expect("entry prefix"),
            section_prefix: Regex::new(
                r"(?i)^(?:tp|take\s*profit|targets?|entries|sl|stop\s*loss|stop)\s*\d*\s*[:\-]\s*",
            )
            .expect("section prefix"),
            thousands: Regex::new(r"(\d+),(\d{3})").expect("thousands pattern"),
            dash_range: Regex::new(r"(\d)[-–](\d)").expect("dash range pattern"),
            number: Regex::new(r"\d+(?:\.\d+)?").expect("number pattern"),
        }
    }

    /// Extracts every signal found in `text`. Returns an empty vector when
    /// the text is not a parseable alert; never errors.
    #[must_use]
    pub fn parse(&self, text: &str, channel_id: &str, message_id: &str) -> Vec<Signal> {
        // Whole text as one signal first.
        if let Some(signal) = self.parse_single(text, channel_id, message_id) {
            return vec![signal];
        }

        let mut signals = Vec::new();

        if text.contains(" / ") {
            // Spaced separator, so symbols like BTC/USDT stay intact.
            for part in text.split(" / ") {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                if let Some(signal) = self.parse_single(part, channel_id, message_id) {
                    signals.push(signal);
                }
            }
        } else if text.matches('/').count() >= 2 && self.side.find_iter(text).count() >= 2 {
            // Bare-slash fallback: only worth attempting when the text holds
            // at least two direction keywords. Re-accumulate parts between
            // keyword occurrences.
            let mut current = String::new();
            for part in text.split('/') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                current.push_str(part);
                current.push(' ');

                if self.side.is_match(part) {
                    if let Some(signal) = self.parse_single(current.trim(), channel_id, message_id)
                    {
                        signals.push(signal);
                        current.clear();
                    }
                }
            }
            if !current.trim().is_empty() {
                if let Some(signal) = self.parse_single(current.trim(), channel_id, message_id) {
                    signals.push(signal);
                }
            }
        }

        if signals.is_empty() {
            tracing::debug!(
                preview = text.chars().take(80).collect::<String>(),
                "no signal in message"
            );
        }
        signals
    }

    fn parse_single(&self, text: &str, channel_id: &str, message_id: &str) -> Option<Signal> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let (entry_text, tp_text, sl_text) = self.extract_sections(text);

        let mut symbol = self.extract_symbol(text);
        let mut side = self.extract_side(text);
        let mut entries = self.parse_price_levels(&entry_text);
        let stop_loss = self.parse_price_levels(&sl_text);
        let take_profits = self.parse_price_levels(&tp_text);
        let leverage = self.extract_leverage(text);

        // Compact one-line forms: "LONG BTCUSDT @ 45000".
        if let Some(caps) = self.at_form.captures(text) {
            side = Some(side_from_keyword(&caps[1]));
            symbol = Some(self.normalize_symbol(&caps[2]));
            if let Ok(price) = Decimal::from_str(&caps[3]) {
                if price > Decimal::ZERO {
                    entries = vec![price];
                }
            }
        }

        // "BUY ETHUSDT 3000-3050": range of two entries.
        if let Some(caps) = self.range_form.captures(text) {
            side = Some(side_from_keyword(&caps[1]));
            symbol = Some(self.normalize_symbol(&caps[2]));
            let low = Decimal::from_str(&caps[3]).ok();
            let high = Decimal::from_str(&caps[4]).ok();
            if let (Some(low), Some(high)) = (low, high) {
                if low > Decimal::ZERO && high > Decimal::ZERO {
                    entries = vec![low, high];
                }
            }
        }

        let symbol = symbol?;
        let side = side?;

        let signal = Signal {
            symbol,
            side,
            entries,
            stop_loss,
            take_profits,
            leverage,
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        };
        tracing::debug!(symbol = %signal.symbol, side = %signal.side, "parsed signal");
        Some(signal)
    }

    /// Finds every label occurrence and attributes the text between
    /// consecutive labels to the section the earlier label names.
    fn extract_sections(&self, text: &str) -> (String, String, String) {
        let mut hits: Vec<LabelHit> = Vec::new();

        for caps in self.label_sep.captures_iter(text) {
            let label = caps.name("label").expect("label group");
            hits.push(LabelHit {
                label_start: label.start(),
                content_start: caps.get(0).expect("match").end(),
                kind: classify_label(label.as_str()),
            });
        }
        for caps in self.label_line.captures_iter(text) {
            let label = caps.name("label").expect("label group");
            hits.push(LabelHit {
                label_start: label.start(),
                content_start: caps.get(0).expect("match").end(),
                kind: classify_label(label.as_str()),
            });
        }

        // Same label may match both patterns; keep the variant that consumed
        // the separator.
        hits.sort_by(|a, b| {
            a.label_start
                .cmp(&b.label_start)
                .then(b.content_start.cmp(&a.content_start))
        });
        hits.dedup_by_key(|h| h.label_start);

        let mut entry_text = String::new();
        let mut tp_text = String::new();
        let mut sl_text = String::new();

        for (i, hit) in hits.iter().enumerate() {
            let end = hits
                .get(i + 1)
                .map_or(text.len(), |next| next.label_start)
                .max(hit.content_start);
            let content = &text[hit.content_start..end];
            let target = match hit.kind {
                SectionKind::Entry => &mut entry_text,
                SectionKind::TakeProfit => &mut tp_text,
                SectionKind::StopLoss => &mut sl_text,
                SectionKind::Boundary => continue,
            };
            target.push_str(content);
            target.push('\n');
        }

        (entry_text, tp_text, sl_text)
    }

    /// Extracts positive price levels from a section, in order of
    /// appearance, de-duplicated.
    fn parse_price_levels(&self, text: &str) -> Vec<Decimal> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // CMP contributes no level; an entry section that is only CMP ends
        // up empty, which downstream treats as a market order.
        let text = self.cmp_word.replace_all(text, "");

        let mut cleaned: Vec<String> = Vec::new();
        for line in text.lines() {
            let mut line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            line = self.numbered_paren_prefix.replace(&line, "").into_owned();
            line = self.numbered_dot_prefix.replace(&line, "").into_owned();
            line = self.dca_prefix.replace_all(&line, "").into_owned();
            line = self.entry_prefix.replace(&line, "").into_owned();
            line = self.section_prefix.replace(&line, "").into_owned();
            if !line.trim().is_empty() {
                cleaned.push(line);
            }
        }

        let mut joined = cleaned.join(" ");

        // Collapse thousands separators: 111,999 -> 111999, iterated for
        // 1,111,999 style values.
        while self.thousands.is_match(&joined) {
            joined = self.thousands.replace_all(&joined, "${1}${2}").into_owned();
        }

        // A dash between digits is a range separator, never a minus sign.
        // Two passes unfold chained ranges (60000-61000-62000).
        for _ in 0..2 {
            joined = self.dash_range.replace_all(&joined, "${1} ${2}").into_owned();
        }

        let mut levels: Vec<Decimal> = Vec::new();
        for m in self.number.find_iter(&joined) {
            let before = joined[..m.start()].chars().next_back();
            let after = joined[m.end()..].chars().next();
            // Skip digits embedded in words or identifiers (10x, v2, 4h).
            if before.is_some_and(char::is_alphabetic) || after.is_some_and(char::is_alphabetic) {
                continue;
            }
            if let Ok(value) = Decimal::from_str(m.as_str()) {
                if value > Decimal::ZERO && !levels.contains(&value) {
                    levels.push(value);
                }
            }
        }
        levels
    }

    fn extract_symbol(&self, text: &str) -> Option<String> {
        if let Some(caps) = self.symbol_labeled.captures(text) {
            return Some(self.normalize_symbol(&caps[1]));
        }
        for pattern in [&self.symbol_slash, &self.symbol_dash, &self.symbol_fused] {
            if let Some(caps) = pattern.captures(text) {
                return Some(self.normalize_symbol(&caps[1]));
            }
        }
        None
    }

    fn extract_side(&self, text: &str) -> Option<Side> {
        self.side
            .captures(text)
            .map(|caps| side_from_keyword(&caps[1]))
    }

    fn extract_leverage(&self, text: &str) -> Option<u8> {
        if let Some(caps) = self.leverage_labeled.captures(text) {
            return caps[1].parse().ok();
        }
        self.leverage_inline
            .captures(text)
            .and_then(|caps| caps[1].parse().ok())
    }

    /// Normalizes `BTC/USDT`, `BTC-USD`, `BTCUSDT`, `BTCPERP` to `BTC`.
    fn normalize_symbol(&self, raw: &str) -> String {
        let upper = raw.trim().to_uppercase();
        let stripped = self.quote_suffix_joined.replace(&upper, "");
        let stripped = self.quote_suffix_fused.replace(&stripped, "");
        stripped.into_owned()
    }
}

fn side_from_keyword(keyword: &str) -> Side {
    if keyword.eq_ignore_ascii_case("long") || keyword.eq_ignore_ascii_case("buy") {
        Side::Buy
    } else {
        Side::Sell
    }
}

fn classify_label(label: &str) -> SectionKind {
    let normalized = label
        .to_lowercase()
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let base = normalized.trim_end_matches(|c: char| c.is_ascii_digit()).trim();

    match base {
        "entry" | "entries" | "entry zone" | "entry zones" | "entry price" | "entry prices"
        | "entry range" | "entry ranges" | "buy zone" | "buy zones" | "buy area" | "cmp"
        | "current market price" | "dca" => SectionKind::Entry,
        "take profit" | "take profits" | "tp" | "target" | "targets" | "profit target"
        | "profit targets" => SectionKind::TakeProfit,
        "stop loss" | "stop losses" | "stop" | "sl" | "stop price" => SectionKind::StopLoss,
        _ => SectionKind::Boundary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trade_relay_core::signal::Side;

    fn parser() -> SignalParser {
        SignalParser::new()
    }

    fn parse_one(text: &str) -> Signal {
        let signals = parser().parse(text, "chan", "msg");
        assert_eq!(signals.len(), 1, "expected one signal from: {text}");
        signals.into_iter().next().unwrap()
    }

    #[test]
    fn canonical_single_line_signal() {
        let signal =
            parse_one("LONG BTCUSDT Entry: 60000 SL: 58000 TP: 62000, 64000 Leverage: 10x");

        assert_eq!(signal.symbol, "BTC");
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.entries, vec![dec!(60000)]);
        assert_eq!(signal.stop_loss, vec![dec!(58000)]);
        assert_eq!(signal.take_profits, vec![dec!(62000), dec!(64000)]);
        assert_eq!(signal.leverage, Some(10));
        assert_eq!(signal.channel_id, "chan");
        assert_eq!(signal.message_id, "msg");
    }

    #[test]
    fn multiline_signal_with_sections() {
        let signal = parse_one(
            "SHORT ETH/USDT\nEntry: 3200\nStop Loss: 3350\nTake Profit:\n1) 3100\n2) 3000\n3) 2900\nLev: 5x",
        );

        assert_eq!(signal.symbol, "ETH");
        assert_eq!(signal.side, Side::Sell);
        assert_eq!(signal.entries, vec![dec!(3200)]);
        assert_eq!(signal.stop_loss, vec![dec!(3350)]);
        assert_eq!(
            signal.take_profits,
            vec![dec!(3100), dec!(3000), dec!(2900)]
        );
        assert_eq!(signal.leverage, Some(5));
    }

    #[test]
    fn dca_lines_accumulate_into_entries() {
        let signal = parse_one(
            "LONG SOL-USDT\nEntry: 150\nDCA2: 145\nDCA3: 140\nSL: 130\nTP: 165",
        );
        assert_eq!(signal.symbol, "SOL");
        assert_eq!(signal.entries, vec![dec!(150), dec!(145), dec!(140)]);
    }

    #[test]
    fn entry_range_with_dash() {
        let signal = parse_one("BUY ZONE: 59000-60000\nLONG BTCUSDT\nSL: 57000");
        assert_eq!(signal.entries, vec![dec!(59000), dec!(60000)]);
    }

    #[test]
    fn thousands_separators_collapse() {
        let signal = parse_one("LONG BTCUSDT Entry: 111,999 SL: 108,500 TP: 1,120,000");
        assert_eq!(signal.entries, vec![dec!(111999)]);
        assert_eq!(signal.stop_loss, vec![dec!(108500)]);
        assert_eq!(signal.take_profits, vec![dec!(1120000)]);
    }

    #[test]
    fn duplicate_levels_deduplicated_in_order() {
        let signal = parse_one("LONG BTCUSDT TP: 62000, 62000, 64000, 62000");
        assert_eq!(signal.take_profits, vec![dec!(62000), dec!(64000)]);
    }

    #[test]
    fn small_decimals_survive() {
        let signal = parse_one("LONG PEPE/USDT Entry: 0.00000662 SL: 0.00000600");
        assert_eq!(signal.entries, vec![dec!(0.00000662)]);
        assert_eq!(signal.stop_loss, vec![dec!(0.00000600)]);
    }

    #[test]
    fn cmp_entry_means_market_order() {
        let signal = parse_one("LONG BTCUSDT Entry: CMP SL: 58000 TP: 62000");
        assert!(signal.entries.is_empty());
        assert_eq!(signal.stop_loss, vec![dec!(58000)]);
    }

    #[test]
    fn symbol_label_takes_priority() {
        let signal = parse_one("PAIR: AVAX/USDT LONG Entry: 40");
        assert_eq!(signal.symbol, "AVAX");
    }

    #[test]
    fn symbol_forms_normalize() {
        assert_eq!(parse_one("LONG BTC/USDT Entry: 60000").symbol, "BTC");
        assert_eq!(parse_one("LONG BTC-USDT Entry: 60000").symbol, "BTC");
        assert_eq!(parse_one("LONG BTCUSDT Entry: 60000").symbol, "BTC");
        assert_eq!(parse_one("SHORT DOGEUSD Entry: 0.1").symbol, "DOGE");
    }

    #[test]
    fn single_char_symbol_with_separator() {
        let signal = parse_one("LONG Q/USDT Entry: 0.02");
        assert_eq!(signal.symbol, "Q");
    }

    #[test]
    fn leverage_forms() {
        assert_eq!(parse_one("LONG BTCUSDT 20x cross").leverage, Some(20));
        assert_eq!(parse_one("LONG BTCUSDT Leverage: 25").leverage, Some(25));
        assert_eq!(parse_one("LONG BTCUSDT lev 10x").leverage, Some(10));
        assert_eq!(parse_one("LONG BTCUSDT Entry: 60000").leverage, None);
    }

    #[test]
    fn leverage_number_not_mistaken_for_price() {
        let signal = parse_one("LONG BTCUSDT Entry: 60000 10x");
        assert_eq!(signal.entries, vec![dec!(60000)]);
    }

    #[test]
    fn at_form_compact_signal() {
        let signal = parse_one("LONG BTCUSDT @ 45000");
        assert_eq!(signal.symbol, "BTC");
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.entries, vec![dec!(45000)]);
    }

    #[test]
    fn range_form_compact_signal() {
        let signal = parse_one("BUY ETHUSDT 3000-3050");
        assert_eq!(signal.symbol, "ETH");
        assert_eq!(signal.entries, vec![dec!(3000), dec!(3050)]);
    }

    #[test]
    fn no_symbol_or_side_yields_nothing() {
        let parser = parser();
        assert!(parser.parse("gm, market looks great today", "c", "m").is_empty());
        assert!(parser.parse("Entry: 60000 SL: 58000", "c", "m").is_empty());
        assert!(parser.parse("LONG with no pair mentioned", "c", "m").is_empty());
        assert!(parser.parse("", "c", "m").is_empty());
    }

    #[test]
    fn whole_text_parse_takes_precedence_over_splitting() {
        // When the full message already yields symbol and side, it is one
        // signal; the separator fallbacks only run on whole-text failure.
        let signals = parser().parse(
            "LONG BTC/USDT Entry: 60000 SL: 58000 / SHORT ETH/USDT Entry: 3200 SL: 3350",
            "c",
            "m",
        );
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].symbol, "BTC");
        assert_eq!(signals[0].side, Side::Buy);
    }

    #[test]
    fn spaced_slash_does_not_break_pair_symbols() {
        // The bare slash in BTC/USDT must not split the message.
        let signals = parser().parse("LONG BTC/USDT Entry: 60000", "c", "m");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].symbol, "BTC");
    }

    #[test]
    fn unparseable_multi_part_text_yields_nothing() {
        // Fallback splitting still finds nothing when no part carries a
        // recognizable symbol, and never panics.
        let signals = parser().parse(
            "going LONG here soon / might SHORT the bounce / no tickers yet",
            "c",
            "m",
        );
        assert!(signals.is_empty());
    }

    #[test]
    fn labels_without_colon_keep_their_numbers() {
        let signal = parse_one("LONG BTCUSDT\nEntry 60000\nSL 58000\nTP 62000");
        assert_eq!(signal.entries, vec![dec!(60000)]);
        assert_eq!(signal.stop_loss, vec![dec!(58000)]);
        assert_eq!(signal.take_profits, vec![dec!(62000)]);
    }

    #[test]
    fn numbered_tp_labels_split_into_levels() {
        let signal = parse_one("SHORT ETHUSDT\nEntry: 3200\nTP1: 3100\nTP2: 3000\nSL1: 3400");
        assert_eq!(signal.take_profits, vec![dec!(3100), dec!(3000)]);
        assert_eq!(signal.stop_loss, vec![dec!(3400)]);
    }

    #[test]
    fn numbered_targets_with_dots() {
        let signal = parse_one("SHORT ETHUSDT\nTargets:\n1. 3100\n2. 3000\nSL: 3400");
        assert_eq!(signal.take_profits, vec![dec!(3100), dec!(3000)]);
    }

    #[test]
    fn side_keywords_map_to_buy_sell() {
        assert_eq!(parse_one("BUY BTCUSDT Entry: 60000").side, Side::Buy);
        assert_eq!(parse_one("SELL BTCUSDT Entry: 60000").side, Side::Sell);
        assert_eq!(parse_one("long btcusdt entry: 60000").side, Side::Buy);
        assert_eq!(parse_one("Short BTCUSDT Entry: 60000").side, Side::Sell);
    }

    #[test]
    fn risk_note_does_not_pollute_targets() {
        let signal = parse_one("LONG BTCUSDT Entry: 60000 TP: 62000 Risk: 2");
        assert_eq!(signal.take_profits, vec![dec!(62000)]);
    }

    #[test]
    fn missing_sections_are_empty_not_errors() {
        let signal = parse_one("LONG BTCUSDT Entry: 60000");
        assert!(signal.stop_loss.is_empty());
        assert!(signal.take_profits.is_empty());
        assert!(signal.leverage.is_none());
    }
}
