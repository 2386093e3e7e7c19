//! End-to-end scenarios: build a unit, compile it, and drive the grammar
//! against live byte streams.

use crate::ast::{AttrKind, HookKind};
use crate::builder::Builder;
use crate::diagnostics::DiagnosticKind;
use crate::pipeline::{compile, CompiledModule};
use crate::runtime::{ByteStream, Matcher, Parsed, ParseResult, RuntimeErrorKind, TraceEvent, Value};
use crate::types::Type;
use crate::Context;

fn request_line() -> CompiledModule {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let method = {
        let re = b.regexp("[^ \\t\\r\\n]+");
        b.literal_field(Some("method"), re, vec![])
    };
    let sp1 = {
        let re = b.regexp("[ \\t]+");
        b.literal_field(None, re, vec![])
    };
    let uri = {
        let re = b.regexp("[^ \\t\\r\\n]+");
        b.literal_field(Some("uri"), re, vec![])
    };
    let sp2 = {
        let re = b.regexp("[ \\t]+");
        b.literal_field(None, re, vec![])
    };
    let version = {
        let re = b.regexp("HTTP/[0-9]+\\.[0-9]+");
        b.literal_field(Some("version"), re, vec![])
    };
    let eol = {
        let re = b.regexp("\\r?\\n");
        b.literal_field(None, re, vec![])
    };
    let done = b.hook(HookKind::Done, 0, vec![]);
    let unit = b.unit(
        "RequestLine",
        vec![method, sp1, uri, sp2, version, eol, done],
    );
    let module = b.module("HTTP", vec![unit]);
    ctx.add_module(module);
    compile(&mut ctx).expect("request line compiles")
}

fn complete(compiled: &CompiledModule, unit: &str, stream: &ByteStream) -> ParseResult {
    let matcher = Matcher::new(&compiled.grammars, &compiled.decls, unit).expect("unit compiled");
    match matcher.run(stream).expect("parse succeeds") {
        Parsed::Complete(result) => result,
        Parsed::Suspended => panic!("parser suspended on a frozen stream"),
    }
}

#[test]
fn http_request_line() {
    let compiled = request_line();
    let input = b"GET /index.html HTTP/1.0\n";
    let stream = ByteStream::frozen_from(input);
    let result = complete(&compiled, "HTTP::RequestLine", &stream);

    assert_eq!(
        result.value.get("method"),
        Some(&Value::Bytes(b"GET".to_vec()))
    );
    assert_eq!(
        result.value.get("uri"),
        Some(&Value::Bytes(b"/index.html".to_vec()))
    );
    assert_eq!(
        result.value.get("version"),
        Some(&Value::Bytes(b"HTTP/1.0".to_vec()))
    );
    assert_eq!(result.consumed, input.len());

    let done_events: Vec<_> = result
        .trace
        .iter()
        .filter(|e| matches!(e, TraceEvent::Hook { event, .. } if event == "%done"))
        .collect();
    assert_eq!(done_events.len(), 1);
}

#[test]
fn http_request_line_survives_any_chunking() {
    let compiled = request_line();
    let input = b"GET /index.html HTTP/1.0\n";
    let whole = complete(
        &compiled,
        "HTTP::RequestLine",
        &ByteStream::frozen_from(input),
    );

    let matcher = Matcher::new(&compiled.grammars, &compiled.decls, "HTTP::RequestLine").unwrap();
    let mut stream = ByteStream::new();
    for byte in input.iter() {
        match matcher.run(&stream).expect("no parse error mid-stream") {
            Parsed::Suspended => {}
            Parsed::Complete(_) => panic!("completed before all bytes arrived"),
        }
        stream.append(&[*byte]).unwrap();
    }
    stream.freeze();
    let chunked = match matcher.run(&stream).unwrap() {
        Parsed::Complete(result) => result,
        Parsed::Suspended => panic!("suspended after freeze"),
    };
    assert_eq!(chunked.value, whole.value);
    assert_eq!(chunked.consumed, whole.consumed);
    assert_eq!(chunked.trace, whole.trace);
}

#[test]
fn counted_vector() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let n = b.field(Some("n"), Type::UInt(8));
    let count = b.self_field("n");
    let attr = b.attr_expr(AttrKind::Count, count);
    let data = b.field_with(Some("data"), Type::UInt(16), vec![attr]);
    let unit = b.unit("Counted", vec![n, data]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("counted unit compiles");

    let stream = ByteStream::frozen_from(&[0x03, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03]);
    let result = complete(&compiled, "M::Counted", &stream);
    assert_eq!(result.value.get("n"), Some(&Value::UInt(3)));
    assert_eq!(
        result.value.get("data"),
        Some(&Value::Vector(vec![
            Value::UInt(1),
            Value::UInt(2),
            Value::UInt(3)
        ]))
    );
    assert_eq!(result.consumed, 7);

    // The structured dump matches the expected shape.
    let dump = to_json(result.value.get("data").unwrap());
    assert_eq!(dump, serde_json::json!([1, 2, 3]));
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::json!(b),
        Value::UInt(v) => serde_json::json!(v),
        Value::SInt(v) => serde_json::json!(v),
        Value::Bytes(b) => serde_json::json!(String::from_utf8_lossy(b)),
        Value::Vector(v) => serde_json::Value::Array(v.iter().map(to_json).collect()),
        Value::Unit(u) => serde_json::Value::Object(
            u.fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        other => serde_json::json!(format!("{:?}", other)),
    }
}

#[test]
fn look_ahead_alternative() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let a = b.regexp("a");
    let alt = b.regexp("b");
    let field = b.alternatives_field(Some("x"), vec![a, alt]);
    let unit = b.unit("Alt", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("alternatives compile");

    for input in [&b"a"[..], &b"b"[..]] {
        let stream = ByteStream::frozen_from(input);
        let result = complete(&compiled, "M::Alt", &stream);
        assert_eq!(result.value.get("x"), Some(&Value::Bytes(input.to_vec())));
        assert_eq!(result.consumed, 1);
    }

    let matcher = Matcher::new(&compiled.grammars, &compiled.decls, "M::Alt").unwrap();
    let err = match matcher.run(&ByteStream::frozen_from(b"c")) {
        Err(e) => e,
        Ok(_) => panic!("input 'c' must not parse"),
    };
    assert_eq!(err.kind, RuntimeErrorKind::ParseError);
    assert_eq!(err.offset, 0);
}

#[test]
fn suspension_on_split_uint32() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let n = b.field(Some("n"), Type::UInt(32));
    let unit = b.unit("Word", vec![n]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("compiles");
    let matcher = Matcher::new(&compiled.grammars, &compiled.decls, "M::Word").unwrap();

    let mut stream = ByteStream::new();
    stream.append(&[0x00, 0x00]).unwrap();
    assert!(matches!(
        matcher.run(&stream).unwrap(),
        Parsed::Suspended
    ));

    stream.append(&[0x00, 0x05]).unwrap();
    stream.freeze();
    match matcher.run(&stream).unwrap() {
        Parsed::Complete(result) => {
            assert_eq!(result.value.get("n"), Some(&Value::UInt(5)));
            assert_eq!(result.consumed, 4);
        }
        Parsed::Suspended => panic!("complete input still suspended"),
    }
}

#[test]
fn literals_round_trip_their_representation() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let magic = b.bytes(b"\x89PNG");
    let magic_field = b.literal_field(Some("magic"), magic, vec![]);
    let version = b.uint(16, 258);
    let version_field = b.literal_field(Some("version"), version, vec![]);
    let unit = b.unit("Magic", vec![magic_field, version_field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("literal unit compiles");

    let stream = ByteStream::frozen_from(b"\x89PNG\x01\x02");
    let result = complete(&compiled, "M::Magic", &stream);
    assert_eq!(
        result.value.get("magic"),
        Some(&Value::Bytes(b"\x89PNG".to_vec()))
    );
    assert_eq!(result.value.get("version"), Some(&Value::UInt(258)));
    assert_eq!(result.consumed, 6);

    let matcher = Matcher::new(&compiled.grammars, &compiled.decls, "M::Magic").unwrap();
    let err = matcher
        .run(&ByteStream::frozen_from(b"\x89PNX\x01\x02"))
        .err()
        .expect("wrong magic fails");
    assert_eq!(err.kind, RuntimeErrorKind::ParseError);
}

#[test]
fn skip_field_advances_without_binding() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let two = b.uint_expr(64, 2);
    let size = b.attr_expr(AttrKind::Size, two);
    let padding = b.skip_field(Type::Bytes, vec![size]);
    let n = b.field(Some("n"), Type::UInt(8));
    let unit = b.unit("Padded", vec![padding, n]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("compiles");

    let result = complete(&compiled, "M::Padded", &ByteStream::frozen_from(&[0, 0, 7]));
    assert_eq!(result.value.get("n"), Some(&Value::UInt(7)));
    assert_eq!(result.value.fields.len(), 1);
    assert_eq!(result.consumed, 3);
}

#[test]
fn duplicated_alternatives_are_rejected() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let a1 = b.regexp("a");
    let a2 = b.regexp("a");
    let field = b.alternatives_field(None, vec![a1, a2]);
    let unit = b.unit("Dup", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = compile(&mut ctx).err().expect("ambiguous grammar rejected");
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::GrammarAmbiguity));
}

#[test]
fn little_endian_byte_order() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let order = {
        let value = b.string("little");
        let value = b.ctor_expr(value);
        b.property("%byte-order", Some(value))
    };
    let n = b.field(Some("n"), Type::UInt(16));
    let unit = b.unit("Le", vec![order, n]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("compiles");

    let stream = ByteStream::frozen_from(&[0x34, 0x12]);
    let result = complete(&compiled, "M::Le", &stream);
    assert_eq!(result.value.get("n"), Some(&Value::UInt(0x1234)));
}

#[test]
fn switch_on_discriminant() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let tag = b.field(Some("tag"), Type::UInt(8));
    let one_label = b.uint_expr(8, 1);
    let small = b.field(Some("small"), Type::UInt(8));
    let case_one = b.switch_case(vec![one_label], vec![small]);
    let two_label = b.uint_expr(8, 2);
    let big = b.field(Some("big"), Type::UInt(16));
    let case_two = b.switch_case(vec![two_label], vec![big]);
    let rest = {
        let eod = b.attr(AttrKind::Eod);
        b.field_with(Some("rest"), Type::Bytes, vec![eod])
    };
    let fallback = b.default_case(vec![rest]);
    let discriminant = b.self_field("tag");
    let switch = b.switch(Some(discriminant), vec![case_one, case_two, fallback]);
    let unit = b.unit("Tagged", vec![tag, switch]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("switch compiles");

    let result = complete(&compiled, "M::Tagged", &ByteStream::frozen_from(&[1, 7]));
    assert_eq!(result.value.get("small"), Some(&Value::UInt(7)));

    let result = complete(
        &compiled,
        "M::Tagged",
        &ByteStream::frozen_from(&[2, 0x01, 0x00]),
    );
    assert_eq!(result.value.get("big"), Some(&Value::UInt(256)));

    let result = complete(
        &compiled,
        "M::Tagged",
        &ByteStream::frozen_from(&[9, 0xaa, 0xbb]),
    );
    assert_eq!(
        result.value.get("rest"),
        Some(&Value::Bytes(vec![0xaa, 0xbb]))
    );
}

#[test]
fn nested_unit_field() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let version = b.field(Some("version"), Type::UInt(8));
    let header = b.unit("Header", vec![version]);
    let head_field = b.field(Some("head"), Type::UnresolvedId("Header".into()));
    let payload = {
        let eod = b.attr(AttrKind::Eod);
        b.field_with(Some("payload"), Type::Bytes, vec![eod])
    };
    let message = b.unit("Message", vec![head_field, payload]);
    let module = b.module("M", vec![header, message]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("nested units compile");

    let stream = ByteStream::frozen_from(&[0x02, 0xde, 0xad]);
    let result = complete(&compiled, "M::Message", &stream);
    match result.value.get("head") {
        Some(Value::Unit(head)) => {
            assert_eq!(head.get("version"), Some(&Value::UInt(2)));
        }
        other => panic!("head is not a unit value: {:?}", other),
    }
    assert_eq!(
        result.value.get("payload"),
        Some(&Value::Bytes(vec![0xde, 0xad]))
    );
}

#[test]
fn requires_attribute_rejects_bad_values() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let dollar = b.dollar();
    let limit = b.uint_expr(8, 100);
    let check = b.op(crate::operators::Operator::Leq, dollar, limit);
    let requires = b.attr_expr(AttrKind::Requires, check);
    let n = b.field_with(Some("n"), Type::UInt(8), vec![requires]);
    let unit = b.unit("Bounded", vec![n]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("compiles");

    let result = complete(&compiled, "M::Bounded", &ByteStream::frozen_from(&[42]));
    assert_eq!(result.value.get("n"), Some(&Value::UInt(42)));

    let matcher = Matcher::new(&compiled.grammars, &compiled.decls, "M::Bounded").unwrap();
    let err = matcher
        .run(&ByteStream::frozen_from(&[200]))
        .err()
        .expect("value over the bound fails");
    assert_eq!(err.kind, RuntimeErrorKind::ParseError);
}

#[test]
fn bytes_until_terminator() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let terminator = b.bytes_expr(b"\x00");
    let until = b.attr_expr(AttrKind::Until, terminator);
    let name = b.field_with(Some("name"), Type::Bytes, vec![until]);
    let tail = b.field(Some("tail"), Type::UInt(8));
    let unit = b.unit("CString", vec![name, tail]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    let compiled = compile(&mut ctx).expect("compiles");

    let stream = ByteStream::frozen_from(b"abc\x00\x07");
    let result = complete(&compiled, "M::CString", &stream);
    assert_eq!(result.value.get("name"), Some(&Value::Bytes(b"abc".to_vec())));
    assert_eq!(result.value.get("tail"), Some(&Value::UInt(7)));
    assert_eq!(result.consumed, 5);
}
