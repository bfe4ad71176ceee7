use std::collections::HashMap;

use tera::{Tera, Value};

/// Register custom Tera filters used by the report template.
///
/// - `money`: two decimals with thousands separators, e.g. `amount | money` -> `12,345.60`
pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

/// Accepts numbers and numeric strings; decimals serialise as strings.
fn tera_money_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let amount = match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| tera::Error::msg(format!("money filter expects a number, got `{text}`")))?,
        Value::Null => 0.0,
        other => {
            return Err(tera::Error::msg(format!("money filter expects a number, got {other}")))
        }
    };
    Ok(Value::String(format_money(amount)))
}

pub fn format_money(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{cents}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::{format_money, tera_money_filter};

    #[test]
    fn money_groups_thousands() {
        assert_eq!(format_money(0.0), "0.00");
        assert_eq!(format_money(999.999), "1,000.00");
        assert_eq!(format_money(1234567.891), "1,234,567.89");
        assert_eq!(format_money(-4321.5), "-4,321.50");
    }

    #[test]
    fn money_filter_accepts_decimal_strings() {
        let args = HashMap::new();

        let rendered = tera_money_filter(&json!("12345.6"), &args).expect("filter");

        assert_eq!(rendered, json!("12,345.60"));
        assert!(tera_money_filter(&json!("n/a"), &args).is_err());
        assert_eq!(tera_money_filter(&json!(null), &args).expect("filter"), json!("0.00"));
    }
}
