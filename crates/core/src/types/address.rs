//! Delivery address rendering.
//!
//! Orders store the shipping address as JSON written by the checkout
//! application. Depending on its version that is either a plain string or an
//! object with loosely named fields. Couriers always get a single line.

use serde_json::Value;

/// Text shown when an order carries no usable address.
pub const NO_ADDRESS: &str = "No address provided";

/// Render a stored shipping address as a single display line.
///
/// - strings are returned as-is (trimmed); blank strings count as missing
/// - objects are joined from `street` (or `address_line1`), `city`, `state`
///   and `zip`, skipping empty parts; an object with none of those fields is
///   rendered as its JSON text
/// - anything else (including `null`) yields [`NO_ADDRESS`]
///
/// ```
/// use courier_portal_core::format_delivery_address;
/// use serde_json::json;
///
/// let addr = json!({"street": "12 Elm St", "city": "Springfield", "zip": "01101"});
/// assert_eq!(format_delivery_address(&addr), "12 Elm St, Springfield, 01101");
/// ```
#[must_use]
pub fn format_delivery_address(address: &Value) -> String {
    match address {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_owned(),
        Value::Object(map) => {
            let field = |key: &str| {
                map.get(key)
                    .and_then(scalar_text)
                    .filter(|s| !s.is_empty())
            };

            let parts: Vec<String> = [
                field("street").or_else(|| field("address_line1")),
                field("city"),
                field("state"),
                field("zip"),
            ]
            .into_iter()
            .flatten()
            .collect();

            if parts.is_empty() {
                address.to_string()
            } else {
                parts.join(", ")
            }
        }
        _ => NO_ADDRESS.to_owned(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
