//! Applies an attribute diff onto a single live host node.
//!
//! Attribute classes are routed by a fixed naming convention because the
//! host semantics differ per class: keys starting with `on` are event
//! bindings (listener add/remove, not attribute mutation), the key
//! `style` accepts a raw string or a per-property map, and boolean values
//! control attribute presence rather than content. Everything else is a
//! plain attribute write.

use crate::host::{Host, HostError, HostId};
use crate::node::{PropValue, Props, StyleValue};

enum PropClass<'a> {
    Listener(&'a str),
    Style,
    Attribute,
}

fn classify(name: &str) -> PropClass<'_> {
    match name.strip_prefix("on") {
        Some(event) if !event.is_empty() => PropClass::Listener(event),
        _ if name == "style" => PropClass::Style,
        _ => PropClass::Attribute,
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Applies exactly the deltas between `old` and `new` to the node `id`:
/// keys gone from `new` are reset, changed or added keys are written,
/// unchanged keys (value equality; pointer equality for handlers) are
/// skipped. Mutates the live handle only; never allocates a new one.
pub(crate) fn patch_props(
    host: &mut dyn Host,
    id: HostId,
    old: &Props,
    new: &Props,
) -> Result<(), HostError> {
    for (name, value) in old {
        if new.contains_key(name) {
            continue;
        }
        match classify(name) {
            PropClass::Listener(event) => {
                if matches!(value, PropValue::Handler(_)) {
                    host.set_listener(id, event, None)?;
                } else {
                    host.remove_attribute(id, name)?;
                }
            }
            PropClass::Style => remove_style_value(host, id, value)?,
            PropClass::Attribute => match value {
                // An absent boolean never wrote an attribute; nothing to
                // reset.
                PropValue::Bool(false) => {}
                PropValue::Data(_) | PropValue::Ref(_) => {}
                _ => host.remove_attribute(id, name)?,
            },
        }
    }

    for (name, value) in new {
        if old.get(name) == Some(value) {
            continue;
        }
        match classify(name) {
            PropClass::Listener(event) => match value {
                PropValue::Handler(handler) => {
                    host.set_listener(id, event, Some(handler.clone()))?;
                }
                other => write_attribute(host, id, name, other)?,
            },
            PropClass::Style => {
                let old_style = match old.get(name) {
                    Some(PropValue::Style(style)) => Some(style),
                    _ => None,
                };
                match value {
                    PropValue::Style(style) => patch_style(host, id, old_style, style)?,
                    other => write_attribute(host, id, name, other)?,
                }
            }
            PropClass::Attribute => write_attribute(host, id, name, value)?,
        }
    }
    Ok(())
}

fn write_attribute(
    host: &mut dyn Host,
    id: HostId,
    name: &str,
    value: &PropValue,
) -> Result<(), HostError> {
    match value {
        PropValue::Text(text) => host.set_attribute(id, name, text),
        PropValue::Number(number) => host.set_attribute(id, name, &format_number(*number)),
        PropValue::Bool(true) => host.set_attribute(id, name, ""),
        PropValue::Bool(false) => host.remove_attribute(id, name),
        // Component-only payloads and misplaced bindings are invisible to
        // host elements.
        PropValue::Data(_) | PropValue::Ref(_) => Ok(()),
        PropValue::Handler(_) => {
            log::warn!("handler bound to non-event attribute {name:?}; skipped");
            Ok(())
        }
        PropValue::Style(_) => {
            log::warn!("style value under non-style attribute {name:?}; skipped");
            Ok(())
        }
    }
}

fn remove_style_value(host: &mut dyn Host, id: HostId, value: &PropValue) -> Result<(), HostError> {
    match value {
        PropValue::Style(StyleValue::Map(map)) => {
            for prop in map.keys() {
                host.remove_style(id, prop)?;
            }
            Ok(())
        }
        _ => host.remove_attribute(id, "style"),
    }
}

fn patch_style(
    host: &mut dyn Host,
    id: HostId,
    old: Option<&StyleValue>,
    new: &StyleValue,
) -> Result<(), HostError> {
    match new {
        StyleValue::Raw(text) => {
            if let Some(StyleValue::Map(old_map)) = old {
                for prop in old_map.keys() {
                    host.remove_style(id, prop)?;
                }
            }
            host.set_attribute(id, "style", text)
        }
        StyleValue::Map(new_map) => {
            match old {
                Some(StyleValue::Map(old_map)) => {
                    for prop in old_map.keys() {
                        if !new_map.contains_key(prop) {
                            host.remove_style(id, prop)?;
                        }
                    }
                }
                Some(StyleValue::Raw(_)) => host.remove_attribute(id, "style")?,
                None => {}
            }
            let old_map = match old {
                Some(StyleValue::Map(map)) => Some(map),
                _ => None,
            };
            for (prop, value) in new_map {
                let unchanged = old_map
                    .and_then(|map| map.get(prop))
                    .is_some_and(|previous| previous == value);
                if !unchanged {
                    host.set_style(id, prop, value)?;
                }
            }
            Ok(())
        }
    }
}
