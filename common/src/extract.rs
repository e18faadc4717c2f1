//! Field extraction from the charger's rendered pages.
//!
//! The device has no API, only hand-written HTML whose element order is the
//! only schema. Everything here is a plain text search over that markup:
//! every extractor is total and falls back to a conservative default when a
//! marker is missing, since the device truncates pages under load.

use crate::types::MirroredState;

/// Marker carried by every value cell (and the status block) on the device pages.
pub const INLINE_MARKER: &str = "class=ins";
pub const STATUS_MARKER: &str = "<div class=ins";
pub const ENABLED_KEYWORD: &str = "ВВІМК";
pub const LED_LABEL: &str = "Світлова";
pub const GROUND_LABEL: &str = "заземлення";
pub const TOTAL_ENERGY_LABEL: &str = "Передана потужність всього";
pub const TARGET_AMPS_MARKER: &str = "selected value='$AMPS";
pub const LOCKED_MARKER: &str = "$AVAIL 0";
pub const SESSION_MARKER: &str = "$TEMPS 0";

pub const UNKNOWN_STATUS: &str = "Unknown";

const LINE_BREAK: &str = "<br>";

pub const CURRENT_FIELD: usize = 2;
pub const VOLTAGE_FIELD: usize = 3;
pub const SESSION_ENERGY_FIELD: usize = 4;
pub const DURATION_FIELD: usize = 5;

/// Positional scanner over a raw HTML document.
#[derive(Debug, Clone, Copy)]
pub struct Markup<'a> {
    html: &'a str,
}

impl<'a> Markup<'a> {
    pub fn new(html: &'a str) -> Self {
        Self { html }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.html.contains(needle)
    }

    /// Byte offset of the first `needle` at or after `from`.
    pub fn find(&self, needle: &str, from: usize) -> Option<usize> {
        self.html
            .get(from..)?
            .find(needle)
            .map(|offset| from + offset)
    }

    /// Offset just past the `n`-th (zero based) occurrence of `marker`.
    pub fn nth_marker_end(&self, marker: &str, n: usize) -> Option<usize> {
        let mut pos = 0;
        for _ in 0..=n {
            pos = self.find(marker, pos)? + marker.len();
        }
        Some(pos)
    }

    /// Text from `from` up to (not including) the first of `delimiters`, or to the end.
    pub fn capture_until(&self, from: usize, delimiters: &[char]) -> &'a str {
        let rest = self.html.get(from..).unwrap_or("");
        let end = rest
            .find(|c: char| delimiters.contains(&c))
            .unwrap_or(rest.len());
        &rest[..end]
    }

    /// Text of the element that opens after `from`: between the next `>` and the next `<`.
    pub fn inline_value(&self, from: usize) -> Option<&'a str> {
        let open = self.find(">", from)? + 1;
        Some(self.capture_until(open, &['<']))
    }

    /// Inline value of the first value cell following `label`.
    pub fn labeled_value(&self, label: &str) -> Option<&'a str> {
        let label_pos = self.find(label, 0)?;
        let cell = self.find(INLINE_MARKER, label_pos)?;
        self.inline_value(cell + INLINE_MARKER.len())
    }

    fn skip_line_breaks(&self, mut pos: usize) -> usize {
        loop {
            let rest = self.html.get(pos..).unwrap_or("");
            if rest.starts_with(LINE_BREAK) {
                pos += LINE_BREAK.len();
            } else if let Some(c) = rest.chars().next().filter(|c| c.is_whitespace()) {
                pos += c.len_utf8();
            } else {
                return pos;
            }
        }
    }
}

pub fn status_text(html: &str) -> String {
    let markup = Markup::new(html);
    let Some(block) = markup.find(STATUS_MARKER, 0) else {
        return UNKNOWN_STATUS.to_string();
    };
    let Some(open) = markup.find(">", block) else {
        return UNKNOWN_STATUS.to_string();
    };

    let start = markup.skip_line_breaks(open + 1);
    markup
        .capture_until(start, &['<'])
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

pub fn nth_float(html: &str, index: usize) -> f32 {
    nth_value(html, index).map(leading_float).unwrap_or(0.0)
}

pub fn nth_duration(html: &str, index: usize) -> u32 {
    nth_value(html, index).map(parse_duration).unwrap_or(0)
}

pub fn labeled_flag(html: &str, label: &str) -> bool {
    Markup::new(html)
        .labeled_value(label)
        .map(|value| value.contains(ENABLED_KEYWORD))
        .unwrap_or(false)
}

/// Selected current limit, or 0.0 when the selector is missing.
pub fn target_amps(html: &str) -> f32 {
    let markup = Markup::new(html);
    markup
        .find(TARGET_AMPS_MARKER, 0)
        .map(|pos| leading_float(markup.capture_until(pos + TARGET_AMPS_MARKER.len(), &['\''])))
        .unwrap_or(0.0)
}

/// Lifetime energy counter. Only the settings page reports it, so a page
/// without the label keeps `previous`.
pub fn lifetime_energy(html: &str, previous: f32) -> f32 {
    let markup = Markup::new(html);
    let Some(label_pos) = markup.find(TOTAL_ENERGY_LABEL, 0) else {
        return previous;
    };
    let Some(cell) = markup.find(INLINE_MARKER, label_pos) else {
        return previous;
    };
    let Some(open) = markup.find(">", cell) else {
        return previous;
    };
    leading_float(markup.capture_until(open + 1, &[' ', '<']))
}

fn nth_value(html: &str, index: usize) -> Option<&str> {
    let markup = Markup::new(html);
    let pos = markup.nth_marker_end(INLINE_MARKER, index)?;
    markup.inline_value(pos)
}

/// Parses the numeric prefix of `text` ("229.6 V" -> 229.6); 0.0 when there is none.
pub fn leading_float(text: &str) -> f32 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for (i, c) in trimmed.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }

    if !seen_digit {
        return 0.0;
    }
    trimmed[..end].parse::<f32>().unwrap_or(0.0)
}

/// `H:MM:SS` to seconds; anything else is 0.
pub fn parse_duration(text: &str) -> u32 {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return 0;
    };

    let parse = |part: &str| part.trim().parse::<u32>().ok();
    match (parse(hours), parse(minutes), parse(seconds)) {
        (Some(h), Some(m), Some(s)) => h
            .saturating_mul(3_600)
            .saturating_add(m.saturating_mul(60))
            .saturating_add(s),
        _ => 0,
    }
}

/// Telemetry read from the status root (`GET /`).
#[derive(Debug, Clone, PartialEq)]
pub struct LiveReading {
    pub status_text: String,
    pub current: f32,
    pub voltage: f32,
    pub session_energy: f32,
    pub duration_s: u32,
}

impl LiveReading {
    pub fn parse(html: &str) -> Self {
        Self {
            status_text: status_text(html),
            current: nth_float(html, CURRENT_FIELD),
            voltage: nth_float(html, VOLTAGE_FIELD),
            session_energy: nth_float(html, SESSION_ENERGY_FIELD),
            duration_s: nth_duration(html, DURATION_FIELD),
        }
    }

    pub fn apply(self, state: &mut MirroredState) {
        state.status_text = self.status_text;
        state.current = self.current;
        state.voltage = self.voltage;
        state.session_energy = self.session_energy;
        state.duration_s = self.duration_s;
    }
}

/// Configuration read from the settings page (`GET /setup`).
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsReading {
    pub led_on: bool,
    pub ground_check: bool,
    pub target_amps: f32,
    pub total_energy: f32,
}

impl SettingsReading {
    pub fn parse(html: &str, previous_total_energy: f32) -> Self {
        Self {
            led_on: labeled_flag(html, LED_LABEL),
            ground_check: labeled_flag(html, GROUND_LABEL),
            target_amps: target_amps(html),
            total_energy: lifetime_energy(html, previous_total_energy),
        }
    }

    pub fn apply(self, state: &mut MirroredState) {
        state.led_on = self.led_on;
        state.ground_check = self.ground_check;
        // 0 means the selector was missing, not a zero limit.
        if self.target_amps > 0.0 {
            state.target_amps = self.target_amps;
        }
        state.total_energy = self.total_energy;
    }
}

/// Lock and session flags read from the security page (`GET /pass`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityReading {
    pub locked: bool,
    pub session_active: bool,
}

impl SecurityReading {
    pub fn parse(html: &str) -> Self {
        let markup = Markup::new(html);
        let locked = markup.contains(LOCKED_MARKER);
        Self {
            locked,
            session_active: locked && markup.contains(SESSION_MARKER),
        }
    }

    pub fn apply(self, state: &mut MirroredState) {
        state.locked = self.locked;
        state.session_active = self.session_active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        security_page, settings_page, status_page, SETTINGS_PAGE, STATUS_PAGE,
        TRUNCATED_STATUS_PAGE,
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_live_fields_by_position() {
        let reading = LiveReading::parse(STATUS_PAGE);

        assert_eq!(
            reading,
            LiveReading {
                status_text: "Charging".to_string(),
                current: 15.8,
                voltage: 229.6,
                session_energy: 4.27,
                duration_s: 2_712,
            }
        );
    }

    #[test]
    fn duration_at_field_five_converts_to_seconds() {
        assert_eq!(nth_duration(STATUS_PAGE, DURATION_FIELD), 2_712);
        assert_eq!(nth_duration(&status_page("Charging", "10:00:01"), 5), 36_001);
    }

    #[test]
    fn malformed_duration_is_zero() {
        assert_eq!(parse_duration("45:12"), 0);
        assert_eq!(parse_duration("--:--:--"), 0);
        assert_eq!(parse_duration(""), 0);
        assert_eq!(nth_duration(&status_page("Wait", "n/a"), DURATION_FIELD), 0);
    }

    #[test]
    fn missing_fields_degrade_to_zero() {
        assert_eq!(nth_float(TRUNCATED_STATUS_PAGE, VOLTAGE_FIELD), 0.0);
        assert_eq!(nth_duration(TRUNCATED_STATUS_PAGE, DURATION_FIELD), 0);
        assert_eq!(nth_float(TRUNCATED_STATUS_PAGE, CURRENT_FIELD), 15.8);
        assert_eq!(nth_float("", 0), 0.0);
    }

    #[test]
    fn status_text_skips_leading_breaks() {
        assert_eq!(status_text(STATUS_PAGE), "Charging");
        assert_eq!(
            status_text("<div class=ins>\r\n<br><br>  Ready to charge\nsecond</div>"),
            "Ready to charge"
        );
        assert_eq!(status_text("<div class=ins></div>"), "");
    }

    #[test]
    fn status_text_without_block_is_unknown() {
        assert_eq!(status_text("<html><body>busy</body></html>"), UNKNOWN_STATUS);
    }

    #[test]
    fn reads_settings_page() {
        let reading = SettingsReading::parse(SETTINGS_PAGE, 0.0);

        assert_eq!(
            reading,
            SettingsReading {
                led_on: true,
                ground_check: false,
                target_amps: 16.0,
                total_energy: 1_234.5,
            }
        );
    }

    #[test]
    fn flags_without_label_are_false() {
        assert!(!labeled_flag("<p><span class=ins>ВВІМКНЕНО</span></p>", LED_LABEL));
        assert!(labeled_flag(
            &settings_page(Some(10), false, true, Some("1.0")),
            GROUND_LABEL
        ));
    }

    #[test]
    fn missing_amps_selector_reads_zero() {
        let html = settings_page(None, true, true, Some("5.0"));

        assert_eq!(target_amps(&html), 0.0);

        let mut state = MirroredState {
            target_amps: 13.0,
            ..MirroredState::default()
        };
        SettingsReading::parse(&html, state.total_energy).apply(&mut state);
        assert_eq!(state.target_amps, 13.0);
    }

    #[test]
    fn missing_energy_label_keeps_previous() {
        let html = settings_page(Some(16), true, true, None);

        assert_eq!(lifetime_energy(&html, 812.25), 812.25);
        assert_eq!(lifetime_energy(SETTINGS_PAGE, 812.25), 1_234.5);
    }

    #[test]
    fn security_page_flags() {
        assert_eq!(
            SecurityReading::parse(&security_page(true, true)),
            SecurityReading {
                locked: true,
                session_active: true,
            }
        );
        assert_eq!(
            SecurityReading::parse(&security_page(true, false)),
            SecurityReading {
                locked: true,
                session_active: false,
            }
        );
        // Session markers mean nothing while the charger is unlocked.
        let unlocked = format!("{}<!-- $TEMPS 0 -->", security_page(false, false));
        assert_eq!(
            SecurityReading::parse(&unlocked),
            SecurityReading {
                locked: false,
                session_active: false,
            }
        );
    }

    #[test]
    fn extraction_is_stateless() {
        let first = LiveReading::parse(STATUS_PAGE);
        let second = LiveReading::parse(STATUS_PAGE);
        assert_eq!(first, second);

        let first = SettingsReading::parse(SETTINGS_PAGE, 3.0);
        let second = SettingsReading::parse(SETTINGS_PAGE, 3.0);
        assert_eq!(first, second);
    }

    #[test]
    fn leading_float_is_lenient() {
        assert_eq!(leading_float("229.6 V"), 229.6);
        assert_eq!(leading_float("  -1.5kWh"), -1.5);
        assert_eq!(leading_float("1.2.3"), 1.2);
        assert_eq!(leading_float("n/a"), 0.0);
        assert_eq!(leading_float("."), 0.0);
    }

    #[test]
    fn markup_scanner_counts_occurrences() {
        let markup = Markup::new("<a class=ins>1</a><b class=ins>2</b>");

        let second = markup.nth_marker_end(INLINE_MARKER, 1).unwrap();
        assert_eq!(markup.inline_value(second), Some("2"));
        assert_eq!(markup.nth_marker_end(INLINE_MARKER, 2), None);
        assert_eq!(markup.capture_until(10_000, &['<']), "");
    }
}
