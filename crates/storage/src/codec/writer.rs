//! Record serialization to the wire format
//!
//! The dual of the reader: one object per record, keys are the record's
//! labels plus the reserved `@id`/`@type` keys, references serialize as
//! nested objects carrying repository, bucket and id. Doubles are written
//! with `{:?}` so integral values keep a fractional part and re-classify as
//! doubles on the next parse.

use super::reader::{ID_KEY, TYPE_KEY};
use shelf_core::{Error, Record, Result, Scalar, StoreReference, Value};

/// Serialize one record to its wire form
///
/// # Errors
/// Fails with `Error::Bucket` if a double field is NaN or infinite; the
/// wire format has no representation for non-finite numbers.
pub fn write_record(record: &Record) -> Result<String> {
    let mut out = String::from("{");
    let mut first = true;

    if let Some(id) = record.id() {
        push_key(&mut out, &mut first, ID_KEY);
        out.push_str(&id.get().to_string());
    }
    if let Some(label) = record.type_label() {
        push_key(&mut out, &mut first, TYPE_KEY);
        out.push_str(&label.to_string());
    }
    for (label, value) in record.entries() {
        push_key(&mut out, &mut first, label);
        write_value(&mut out, label, value)?;
    }

    out.push('}');
    Ok(out)
}

fn push_key(out: &mut String, first: &mut bool, key: &str) {
    if !*first {
        out.push(',');
    }
    *first = false;
    write_string(out, key);
    out.push(':');
}

fn write_value(out: &mut String, label: &str, value: &Value) -> Result<()> {
    match value {
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Long(l) => out.push_str(&l.to_string()),
        Value::Double(d) => write_double(out, label, *d)?,
        Value::Str(s) => write_string(out, s),
        Value::Scalars(list) => {
            out.push('[');
            for (i, scalar) in list.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_scalar(out, label, scalar)?;
            }
            out.push(']');
        }
        Value::References(list) => {
            out.push('[');
            for (i, reference) in list.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_reference(out, reference);
            }
            out.push(']');
        }
        Value::Reference(reference) => write_reference(out, reference),
    }
    Ok(())
}

fn write_scalar(out: &mut String, label: &str, scalar: &Scalar) -> Result<()> {
    match scalar {
        Scalar::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Scalar::Int(i) => out.push_str(&i.to_string()),
        Scalar::Long(l) => out.push_str(&l.to_string()),
        Scalar::Double(d) => write_double(out, label, *d)?,
        Scalar::Str(s) => write_string(out, s),
    }
    Ok(())
}

fn write_double(out: &mut String, label: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::bucket(format!(
            "cannot serialize non-finite double for label '{label}'"
        )));
    }
    out.push_str(&format!("{value:?}"));
    Ok(())
}

fn write_reference(out: &mut String, reference: &StoreReference) {
    out.push('{');
    write_string(out, "repository");
    out.push(':');
    write_string(out, &reference.repository);
    out.push(',');
    write_string(out, "bucket");
    out.push(':');
    write_string(out, &reference.bucket);
    out.push(',');
    write_string(out, "id");
    out.push(':');
    out.push_str(&reference.id.get().to_string());
    out.push('}');
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
