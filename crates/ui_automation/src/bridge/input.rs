//! Shell-fragment formatters for input primitives
//!
//! Each formatter returns the `input …` fragment for one gesture so the
//! flow executor can join consecutive primitives with `&&` into a single
//! device round-trip.

use phf::phf_map;

/// Android keycode names accepted by key steps, mapped to their numeric
/// codes. Numeric strings pass through unchanged.
static KEYCODES: phf::Map<&'static str, u32> = phf_map! {
    "HOME" => 3,
    "BACK" => 4,
    "DPAD_UP" => 19,
    "DPAD_DOWN" => 20,
    "DPAD_LEFT" => 21,
    "DPAD_RIGHT" => 22,
    "DPAD_CENTER" => 23,
    "VOLUME_UP" => 24,
    "VOLUME_DOWN" => 25,
    "POWER" => 26,
    "CAMERA" => 27,
    "TAB" => 61,
    "SPACE" => 62,
    "ENTER" => 66,
    "DEL" => 67,
    "MENU" => 82,
    "SEARCH" => 84,
    "PAGE_UP" => 92,
    "PAGE_DOWN" => 93,
    "ESCAPE" => 111,
    "FORWARD_DEL" => 112,
    "MOVE_HOME" => 122,
    "MOVE_END" => 123,
    "APP_SWITCH" => 187,
    "WAKEUP" => 224,
};

/// Resolve a key name or numeric string to the argument passed to
/// `input keyevent`
pub fn resolve_keycode(key: &str) -> String {
    let upper = key.trim().to_uppercase();
    let name = upper.trim_start_matches("KEYCODE_");
    if let Some(code) = KEYCODES.get(name) {
        return code.to_string();
    }
    if key.trim().chars().all(|c| c.is_ascii_digit()) && !key.trim().is_empty() {
        return key.trim().to_string();
    }
    // Unknown names go through verbatim; the device rejects them with a
    // readable error
    format!("KEYCODE_{}", name)
}

pub fn tap(x: i32, y: i32) -> String {
    format!("input tap {} {}", x, y)
}

pub fn swipe(x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: Option<u32>) -> String {
    match duration_ms {
        Some(d) => format!("input swipe {} {} {} {} {}", x1, y1, x2, y2, d),
        None => format!("input swipe {} {} {} {}", x1, y1, x2, y2),
    }
}

pub fn keyevent(key: &str) -> String {
    format!("input keyevent {}", resolve_keycode(key))
}

pub fn sleep(duration_ms: u64) -> String {
    format!("sleep {:.3}", duration_ms as f64 / 1000.0)
}

/// Format an `input text` fragment. `input text` treats a literal space as
/// an argument separator, so spaces become `%s`; the rest is single-quoted
/// for the device shell.
pub fn text(value: &str) -> String {
    let encoded = value.replace(' ', "%s").replace('\'', "'\\''");
    format!("input text '{}'", encoded)
}

/// One `input keyevent` per key, joined so the whole sequence is a single
/// shell fragment. An interval inserts device-side sleeps between presses.
pub fn key_sequence(keys: &[String], interval_ms: Option<u64>) -> String {
    let parts: Vec<String> = keys.iter().map(|k| keyevent(k)).collect();
    match interval_ms {
        Some(gap) if gap > 0 => parts.join(&format!(" && {} && ", sleep(gap))),
        _ => parts.join(" && "),
    }
}
