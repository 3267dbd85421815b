//! Field-value collections used for driver and OBM configuration.

/// Key-value tuple representing a field and its value.
pub type FieldValue = (String, String);

/// Collection of field-value pairs, e.g. a switch's driver configuration.
pub type FieldValues = Vec<FieldValue>;

/// Helper trait for working with field-value collections.
pub trait FieldValuesExt {
    /// Gets the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Gets the value for a field, returning the default if not present.
    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str;

    /// Checks if a field exists.
    fn has_field(&self, field: &str) -> bool;

    /// Returns the field names in their original order.
    fn field_names(&self) -> Vec<&str>;
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.get_field(field).unwrap_or(default)
    }

    fn has_field(&self, field: &str) -> bool {
        self.iter().any(|(f, _)| f == field)
    }

    fn field_names(&self) -> Vec<&str> {
        self.iter().map(|(f, _)| f.as_str()).collect()
    }
}

/// Builds a FieldValues collection from key-value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_values_ext() {
        let fvs: FieldValues = vec![
            ("hostname".to_string(), "switch.example.com".to_string()),
            ("username".to_string(), "admin".to_string()),
        ];

        assert_eq!(fvs.get_field("hostname"), Some("switch.example.com"));
        assert_eq!(fvs.get_field("password"), None);
        assert_eq!(fvs.get_field_or("password", "secret"), "secret");
        assert!(fvs.has_field("username"));
        assert_eq!(fvs.field_names(), vec!["hostname", "username"]);
    }

    #[test]
    fn test_field_values_macro() {
        let fvs: FieldValues = field_values! {
            "hostname" => "http://example.com",
            "username" => "admin",
            "password" => "admin",
        };

        assert_eq!(fvs.len(), 3);
        assert_eq!(fvs.get_field("password"), Some("admin"));
    }
}
