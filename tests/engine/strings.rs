//! String width, codec and length limit tests

use super::{create_test_context, take_error};
use qjs_core::{
    Context, ErrorKind, InvalidStringLength, JsString, JsValue, Runtime, RuntimeConfig,
    StringBuilder,
};

#[test]
fn test_concat_narrow_with_wide_widens() {
    let narrow = JsString::from("abc");
    let wide = JsString::from_utf16(vec![0x263A]);
    assert!(!narrow.is_wide());
    assert!(wide.is_wide());

    let joined = narrow.concat(&wide).unwrap();
    assert!(joined.is_wide());
    assert_eq!(joined.len(), 4);
    let units: Vec<u16> = joined.units().collect();
    assert_eq!(units, vec![b'a' as u16, b'b' as u16, b'c' as u16, 0x263A]);
    assert_eq!(joined, "abc\u{263A}");
}

#[test]
fn test_surrogate_pairs_count_as_two_units() {
    let s = JsString::from("x\u{1F600}");
    assert!(s.is_wide());
    assert_eq!(s.len(), 3);
    assert_eq!(s.unit_at(1), Some(0xD83D));
    assert_eq!(s.unit_at(2), Some(0xDE00));
    assert_eq!(s.to_utf8(), "x\u{1F600}");
}

#[test]
fn test_utf8_round_trip_and_lossy_decode() {
    for text in ["", "plain", "caf\u{e9}", "\u{4e2d}\u{6587}", "\u{1F600} ok"] {
        let s = JsString::from_utf8(text.as_bytes());
        assert_eq!(s.to_utf8(), text);
        assert_eq!(JsString::from_utf8(s.to_utf8().as_bytes()), s);
    }
    let broken = JsString::from_utf8(&[b'a', 0xFF, b'b']);
    assert_eq!(broken, "a\u{FFFD}b");
}

#[test]
fn test_substring_narrows_again() {
    let s = JsString::from("ab\u{263A}cd");
    assert!(s.is_wide());
    let tail = s.substring(3, 5);
    assert!(!tail.is_wide());
    assert_eq!(tail, "cd");
}

#[test]
fn test_builder_limit() {
    let mut builder = StringBuilder::new().with_limit(4);
    builder.push_str("abcd").unwrap();
    assert_eq!(builder.push_unit(b'e' as u16), Err(InvalidStringLength));
    assert_eq!(builder.finish(), "abcd");
}

#[test]
fn test_new_string_respects_configured_limit() {
    let config = RuntimeConfig {
        max_string_len: 8,
        ..RuntimeConfig::default()
    };
    let rt = Runtime::with_config(config);
    let ctx = Context::new(&rt).unwrap();

    assert_eq!(ctx.new_string("short").unwrap(), JsValue::from("short"));
    let err = ctx.new_string("far too long for this").unwrap_err();
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::RangeError);
    assert_eq!(message, "invalid string length");
}

#[test]
fn test_to_string_conversions() {
    let ctx = create_test_context();
    let cases: Vec<(JsValue, &str)> = vec![
        (JsValue::Undefined, "undefined"),
        (JsValue::Null, "null"),
        (JsValue::from(true), "true"),
        (JsValue::from(42), "42"),
        (JsValue::from(1.5), "1.5"),
        (JsValue::number(f64::NAN), "NaN"),
        (JsValue::from("text"), "text"),
    ];
    for (value, expected) in cases {
        assert_eq!(ctx.to_string(&value).unwrap(), expected, "{value:?}");
    }
}

#[test]
fn test_symbol_to_string_throws() {
    let ctx = create_test_context();
    let sym = ctx.new_symbol(Some("s"));
    let err = ctx.to_string(&sym).unwrap_err();
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::TypeError);
    assert_eq!(message, "cannot convert a symbol to a string");
}
