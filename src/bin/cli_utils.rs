use geoip::DataValue;
use std::fmt::Write;

/// Render a decoded value as indented text for terminal output
pub fn format_data_value(data: &DataValue, indent: &str) -> String {
    match data {
        DataValue::String(s) => format!("\"{}\"", s),
        DataValue::Bytes(b) => format!("{:02x?}", b),
        DataValue::Double(d) => d.to_string(),
        DataValue::Float(f) => f.to_string(),
        DataValue::Int32(n) => n.to_string(),
        DataValue::Uint16(n) => n.to_string(),
        DataValue::Uint32(n) => n.to_string(),
        DataValue::Uint64(n) => n.to_string(),
        DataValue::Uint128(n) => n.to_string(),
        DataValue::Bool(b) => b.to_string(),
        DataValue::Map(entries) if entries.is_empty() => "{}".to_string(),
        DataValue::Map(entries) => {
            let inner = format!("{}  ", indent);
            let mut out = String::from("{\n");
            for (key, value) in entries.iter() {
                let _ = writeln!(out, "{}{}: {},", inner, key, format_data_value(value, &inner));
            }
            out.push_str(indent);
            out.push('}');
            out
        }
        DataValue::Array(items) => {
            let rendered: Vec<_> = items
                .iter()
                .map(|item| format_data_value(item, indent))
                .collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}
