//! Proto-like rendering of reflected symbols.

use std::fmt::Write as _;

use prost_reflect::{
    DescriptorPool, EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor, MethodDescriptor,
    OneofDescriptor, ServiceDescriptor,
};
use serde_json::{json, Map, Value as Json};

use super::RpcError;

/// Nested messages deeper than this render as `{}` in templates.
pub const MAX_TEMPLATE_DEPTH: usize = 4;

pub fn find_service(pool: &DescriptorPool, name: &str) -> Result<ServiceDescriptor, RpcError> {
    pool.get_service_by_name(name)
        .ok_or_else(|| RpcError::SymbolNotFound(name.to_string()))
}

/// `<symbol> is a <kind>:` followed by its definition.
pub fn describe_symbol(pool: &DescriptorPool, symbol: &str) -> Result<String, RpcError> {
    if let Some(service) = pool.get_service_by_name(symbol) {
        return Ok(format!("{} is a service:\n{}", symbol, render_service(&service)));
    }
    if let Some(message) = pool.get_message_by_name(symbol) {
        let template = serde_json::to_string_pretty(&message_template(&message, 0))
            .map_err(|e| RpcError::Reflection(e.to_string()))?;
        return Ok(format!(
            "{} is a message:\n{}\nMessage template:\n{}\n",
            symbol,
            render_message(&message, ""),
            template
        ));
    }
    if let Some(enumeration) = pool.get_enum_by_name(symbol) {
        return Ok(format!("{} is an enum:\n{}", symbol, render_enum(&enumeration, "")));
    }

    let not_found = || RpcError::SymbolNotFound(symbol.to_string());
    let (parent, name) = symbol.rsplit_once('.').ok_or_else(not_found)?;

    if let Some(service) = pool.get_service_by_name(parent) {
        let method = service.methods().find(|m| m.name() == name).ok_or_else(not_found)?;
        return Ok(format!("{} is a method:\n{}\n", symbol, render_method(&method)));
    }
    if let Some(message) = pool.get_message_by_name(parent) {
        if let Some(field) = message.get_field_by_name(name) {
            return Ok(format!("{} is a field:\n{}\n", symbol, render_field(&field)));
        }
        if let Some(oneof) = message.oneofs().find(|o| o.name() == name) {
            return Ok(format!("{} is a one-of:\n{}", symbol, render_oneof(&oneof, "")));
        }
    }
    if let Some(enumeration) = pool.get_enum_by_name(parent) {
        if let Some(value) = enumeration.get_value_by_name(name) {
            return Ok(format!(
                "{} is an enum value:\n{} = {};\n",
                symbol,
                value.name(),
                value.number()
            ));
        }
    }

    Err(not_found())
}

fn render_service(service: &ServiceDescriptor) -> String {
    let mut out = format!("service {} {{\n", service.name());
    for method in service.methods() {
        let _ = writeln!(out, "  {}", render_method(&method));
    }
    out.push_str("}\n");
    out
}

fn render_method(method: &MethodDescriptor) -> String {
    let stream = |yes: bool| if yes { "stream " } else { "" };
    format!(
        "rpc {} ( {}.{} ) returns ( {}.{} );",
        method.name(),
        stream(method.is_client_streaming()),
        method.input().full_name(),
        stream(method.is_server_streaming()),
        method.output().full_name()
    )
}

fn render_message(message: &MessageDescriptor, indent: &str) -> String {
    let inner = format!("{}  ", indent);
    let mut out = format!("{}message {} {{\n", indent, message.name());

    for nested in message.child_messages().filter(|m| !m.is_map_entry()) {
        out.push_str(&render_message(&nested, &inner));
    }
    for enumeration in message.child_enums() {
        out.push_str(&render_enum(&enumeration, &inner));
    }
    let in_real_oneof =
        |f: &FieldDescriptor| f.containing_oneof().is_some_and(|o| !is_synthetic_oneof(&o));
    for field in message.fields().filter(|f| !in_real_oneof(f)) {
        let _ = writeln!(out, "{}{}", inner, render_field(&field));
    }
    for oneof in message.oneofs().filter(|o| !is_synthetic_oneof(o)) {
        out.push_str(&render_oneof(&oneof, &inner));
    }

    let _ = writeln!(out, "{}}}", indent);
    out
}

fn render_enum(enumeration: &EnumDescriptor, indent: &str) -> String {
    let mut out = format!("{}enum {} {{\n", indent, enumeration.name());
    for value in enumeration.values() {
        let _ = writeln!(out, "{}  {} = {};", indent, value.name(), value.number());
    }
    let _ = writeln!(out, "{}}}", indent);
    out
}

/// The compiler wraps each proto3 `optional` field in a one-field oneof.
fn is_synthetic_oneof(oneof: &OneofDescriptor) -> bool {
    let mut fields = oneof.fields();
    match (fields.next(), fields.next()) {
        (Some(field), None) => field.field_descriptor_proto().proto3_optional(),
        _ => false,
    }
}

fn render_oneof(oneof: &OneofDescriptor, indent: &str) -> String {
    let mut out = format!("{}oneof {} {{\n", indent, oneof.name());
    for field in oneof.fields() {
        let _ = writeln!(out, "{}  {}", indent, render_field(&field));
    }
    let _ = writeln!(out, "{}}}", indent);
    out
}

fn render_field(field: &FieldDescriptor) -> String {
    let label = if field.is_list() {
        "repeated "
    } else if field.field_descriptor_proto().proto3_optional() {
        "optional "
    } else {
        ""
    };
    format!(
        "{}{} {} = {};",
        label,
        field_type(field),
        field.name(),
        field.number()
    )
}

fn field_type(field: &FieldDescriptor) -> String {
    if field.is_map() {
        if let Kind::Message(entry) = field.kind() {
            return format!(
                "map<{}, {}>",
                kind_name(&entry.map_entry_key_field().kind()),
                kind_name(&entry.map_entry_value_field().kind())
            );
        }
    }
    kind_name(&field.kind())
}

fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".into(),
        Kind::Float => "float".into(),
        Kind::Int32 => "int32".into(),
        Kind::Int64 => "int64".into(),
        Kind::Uint32 => "uint32".into(),
        Kind::Uint64 => "uint64".into(),
        Kind::Sint32 => "sint32".into(),
        Kind::Sint64 => "sint64".into(),
        Kind::Fixed32 => "fixed32".into(),
        Kind::Fixed64 => "fixed64".into(),
        Kind::Sfixed32 => "sfixed32".into(),
        Kind::Sfixed64 => "sfixed64".into(),
        Kind::Bool => "bool".into(),
        Kind::String => "string".into(),
        Kind::Bytes => "bytes".into(),
        Kind::Message(m) => format!(".{}", m.full_name()),
        Kind::Enum(e) => format!(".{}", e.full_name()),
    }
}

/// JSON skeleton of `message` using proto3 JSON names.
pub fn message_template(message: &MessageDescriptor, depth: usize) -> Json {
    if let Some(known) = well_known_template(message.full_name()) {
        return known;
    }
    if depth >= MAX_TEMPLATE_DEPTH {
        return json!({});
    }

    let mut object = Map::new();
    for field in message.fields() {
        let value = if field.is_map() {
            match field.kind() {
                Kind::Message(entry) => {
                    let key = map_key_template(&entry.map_entry_key_field().kind());
                    let value = kind_template(&entry.map_entry_value_field().kind(), depth);
                    Json::Object(Map::from_iter([(key, value)]))
                }
                _ => json!({}),
            }
        } else if field.is_list() {
            json!([kind_template(&field.kind(), depth)])
        } else {
            kind_template(&field.kind(), depth)
        };
        object.insert(field.json_name().to_string(), value);
    }
    Json::Object(object)
}

fn kind_template(kind: &Kind, depth: usize) -> Json {
    match kind {
        Kind::Double | Kind::Float => json!(0.0),
        Kind::Int32 | Kind::Uint32 | Kind::Sint32 | Kind::Fixed32 | Kind::Sfixed32 => json!(0),
        // 64-bit integers are strings in proto3 JSON.
        Kind::Int64 | Kind::Uint64 | Kind::Sint64 | Kind::Fixed64 | Kind::Sfixed64 => json!("0"),
        Kind::Bool => json!(false),
        Kind::String | Kind::Bytes => json!(""),
        Kind::Enum(e) => json!(e.default_value().name()),
        Kind::Message(m) => message_template(m, depth + 1),
    }
}

fn map_key_template(kind: &Kind) -> String {
    match kind {
        Kind::String => String::new(),
        Kind::Bool => "false".into(),
        _ => "0".into(),
    }
}

fn well_known_template(full_name: &str) -> Option<Json> {
    let value = match full_name {
        "google.protobuf.Timestamp" => json!("1970-01-01T00:00:00Z"),
        "google.protobuf.Duration" => json!("0s"),
        "google.protobuf.Empty" | "google.protobuf.Struct" => json!({}),
        "google.protobuf.Value" => Json::Null,
        "google.protobuf.ListValue" => json!([]),
        "google.protobuf.Any" => json!({ "@type": "" }),
        "google.protobuf.FieldMask" => json!(""),
        "google.protobuf.StringValue" | "google.protobuf.BytesValue" => json!(""),
        "google.protobuf.BoolValue" => json!(false),
        "google.protobuf.Int64Value" | "google.protobuf.UInt64Value" => json!("0"),
        "google.protobuf.Int32Value" | "google.protobuf.UInt32Value" => json!(0),
        "google.protobuf.DoubleValue" | "google.protobuf.FloatValue" => json!(0.0),
        _ => return None,
    };
    Some(value)
}
