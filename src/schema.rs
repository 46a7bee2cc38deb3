//! Attribute schema
//!
//! Static, data-driven table of every attribute the bridge exposes. Each
//! [`AttributeSpec`] carries the instrument keyword used to read it, the
//! keyword used to write it (absent for read-only attributes), its value type,
//! optional numeric bounds and a unit. The schema is built once, validated,
//! and then shared read-only behind an `Arc`.
//!
//! # Example
//!
//! ```
//! use bbfe_bridge::schema::{AttributeSchema, AttributeSpec, ValueType};
//!
//! let schema = AttributeSchema::new(vec![
//!     AttributeSpec::new("Brightness", ValueType::Integer, "BRI:AWA")
//!         .writable_as("BRI:AWA")
//!         .with_range(10.0, 100.0)
//!         .with_unit("%"),
//! ])
//! .unwrap();
//!
//! assert!(schema.lookup("Brightness").unwrap().is_writable());
//! ```

use crate::error::{BridgeError, BridgeResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Signed integer (instrument shorts).
    Integer,
    /// Double precision float.
    Float,
    /// Free text, passed through unchanged.
    String,
}

impl ValueType {
    /// True for `Integer` and `Float`.
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Float)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Integer => write!(f, "integer"),
            ValueType::Float => write!(f, "float"),
            ValueType::String => write!(f, "string"),
        }
    }
}

/// A value read from or written to the instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    String(String),
}

impl TypedValue {
    /// Type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            TypedValue::Integer(_) => ValueType::Integer,
            TypedValue::Float(_) => ValueType::Float,
            TypedValue::String(_) => ValueType::String,
        }
    }

    /// Numeric view, `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Integer(v) => Some(*v as f64),
            TypedValue::Float(v) => Some(*v),
            TypedValue::String(_) => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Integer(v) => write!(f, "{v}"),
            TypedValue::Float(v) => write!(f, "{v}"),
            TypedValue::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        TypedValue::Integer(v)
    }
}

impl From<i32> for TypedValue {
    fn from(v: i32) -> Self {
        TypedValue::Integer(i64::from(v))
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        TypedValue::Float(v)
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::String(v.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        TypedValue::String(v)
    }
}

/// Description of one controllable or observable attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeSpec {
    /// Unique attribute name.
    pub name: String,
    /// Value type used for coercion.
    pub value_type: ValueType,
    /// Keyword sent (with a trailing `?`) to read the attribute.
    pub read_keyword: String,
    /// Keyword used to write the attribute; `None` means read-only.
    pub write_keyword: Option<String>,
    /// Human readable description.
    pub description: String,
    /// Inclusive lower bound (numeric attributes only).
    pub min_value: Option<f64>,
    /// Inclusive upper bound (numeric attributes only).
    pub max_value: Option<f64>,
    /// Physical unit.
    pub unit: Option<String>,
}

impl AttributeSpec {
    /// Create a read-only attribute with no bounds, unit or description.
    pub fn new(name: impl Into<String>, value_type: ValueType, read_keyword: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type,
            read_keyword: read_keyword.into(),
            write_keyword: None,
            description: String::new(),
            min_value: None,
            max_value: None,
            unit: None,
        }
    }

    /// Make the attribute writable with the given keyword.
    pub fn writable_as(mut self, keyword: impl Into<String>) -> Self {
        self.write_keyword = Some(keyword.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set inclusive numeric bounds.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    /// Set the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// True when a write keyword is present.
    pub fn is_writable(&self) -> bool {
        self.write_keyword.is_some()
    }

    /// Display label, same as the attribute name.
    pub fn label(&self) -> &str {
        &self.name
    }

    /// `(min, max)` when both bounds are set.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.min_value.zip(self.max_value)
    }

    /// Check a value against the attribute's type and bounds before writing.
    ///
    /// An integer is accepted for a float attribute; nothing else is converted.
    pub fn check_value(&self, value: &TypedValue) -> BridgeResult<()> {
        let type_ok = match (self.value_type, value) {
            (ValueType::Integer, TypedValue::Integer(_)) => true,
            (ValueType::Float, TypedValue::Float(_) | TypedValue::Integer(_)) => true,
            (ValueType::String, TypedValue::String(_)) => true,
            _ => false,
        };
        if !type_ok {
            return Err(BridgeError::TypeMismatch {
                attribute: self.name.clone(),
                expected: self.value_type,
            });
        }

        if let Some(v) = value.as_f64() {
            let below = self.min_value.is_some_and(|min| v < min);
            let above = self.max_value.is_some_and(|max| v > max);
            if below || above {
                return Err(BridgeError::OutOfRange {
                    attribute: self.name.clone(),
                    value: v,
                    min: self.min_value.unwrap_or(f64::NEG_INFINITY),
                    max: self.max_value.unwrap_or(f64::INFINITY),
                });
            }
        }
        Ok(())
    }
}

/// Immutable name → spec table.
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    specs: Vec<AttributeSpec>,
    index: HashMap<String, usize>,
}

impl AttributeSchema {
    /// Build and validate a schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` when a name is duplicated, a read keyword is
    /// empty, or a numeric attribute has `min_value > max_value`.
    pub fn new(specs: Vec<AttributeSpec>) -> BridgeResult<Self> {
        let schema = Self::build(specs);
        schema.validate()?;
        Ok(schema)
    }

    fn build(specs: Vec<AttributeSpec>) -> Self {
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), i))
            .collect();
        Self { specs, index }
    }

    /// Check the construction-time invariants.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.index.len() != self.specs.len() {
            let mut seen = std::collections::HashSet::new();
            let duplicate = self
                .specs
                .iter()
                .find(|spec| !seen.insert(spec.name.as_str()))
                .map(|spec| spec.name.clone())
                .unwrap_or_default();
            return Err(BridgeError::InvalidSchema(format!(
                "duplicate attribute name '{duplicate}'"
            )));
        }

        for spec in &self.specs {
            if spec.read_keyword.trim().is_empty() {
                return Err(BridgeError::InvalidSchema(format!(
                    "attribute '{}' has an empty read keyword",
                    spec.name
                )));
            }
            if matches!(&spec.write_keyword, Some(kw) if kw.trim().is_empty()) {
                return Err(BridgeError::InvalidSchema(format!(
                    "attribute '{}' has an empty write keyword",
                    spec.name
                )));
            }
            if let Some((min, max)) = spec.bounds() {
                if spec.value_type.is_numeric() && min > max {
                    return Err(BridgeError::InvalidSchema(format!(
                        "attribute '{}' has min {} > max {}",
                        spec.name, min, max
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up an attribute by name.
    pub fn lookup(&self, name: &str) -> BridgeResult<&AttributeSpec> {
        self.index
            .get(name)
            .map(|&i| &self.specs[i])
            .ok_or_else(|| BridgeError::UnknownAttribute(name.to_string()))
    }

    /// Attributes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.specs.iter()
    }

    /// Attribute names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|spec| spec.name.as_str())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// True when the schema has no attributes.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// The Libera BBFE attribute table, built once and shared.
    pub fn libera_bbfe() -> Arc<AttributeSchema> {
        static SCHEMA: Lazy<Arc<AttributeSchema>> =
            Lazy::new(|| Arc::new(AttributeSchema::build(libera_bbfe_specs())));
        SCHEMA.clone()
    }
}

fn rw(name: &str, keyword: &str, description: &str, min: f64, max: f64, unit: &str) -> AttributeSpec {
    AttributeSpec::new(name, ValueType::Integer, keyword)
        .writable_as(keyword)
        .with_description(description)
        .with_range(min, max)
        .with_unit(unit)
}

fn ro(name: &str, value_type: ValueType, keyword: &str, description: &str, unit: Option<&str>) -> AttributeSpec {
    let spec = AttributeSpec::new(name, value_type, keyword).with_description(description);
    match unit {
        Some(unit) => spec.with_unit(unit),
        None => spec,
    }
}

fn libera_bbfe_specs() -> Vec<AttributeSpec> {
    use ValueType::{Float, Integer, String};

    vec![
        // LCD
        rw("TimeToSleep", "TIM:SLE", "Time before LCD enters into sleep mode", 1.0, 60.0, "min"),
        rw("BrightnessInSleep", "BRI:SLE", "Brightness of the LCD in sleep mode", 0.0, 100.0, "%"),
        rw("BrightnessInAwakened", "BRI:AWA", "Brightness of the LCD in normal mode", 10.0, 100.0, "%"),
        // Cooling
        rw("FanSpeedSetpoint", "FAN:SSP", "Fan speed setpoint", 1000.0, 7500.0, "rpm"),
        ro("FanSpeed", Integer, "FAN:MSP", "Fan speed", Some("rpm")),
        rw("TemperatureLimit", "TEM:LIM", "Temperature limit where Libera shuts down", 20.0, 60.0, "C"),
        ro("Temperature", Float, "TEM:INS", "Temperature inside the libera", Some("C")),
        ro("TemperatureAlarm", String, "TEM:ALA", "Temperature alarm status", None),
        ro("Uptime", String, "TIM:UP", "Time since instrument start-up", None),
        // Supplies
        ro("Volt33", Float, "VOL:3V3", "Actual value of the 3.3V supply voltage", Some("volts")),
        ro("Volt5", Float, "VOL:5V", "Actual value of the 5V supply voltage", Some("volts")),
        ro("Volt_5", Float, "VOL:-5V", "Actual value of the -5V supply voltage", Some("volts")),
        ro("Volt8", Float, "VOL:8V", "Actual value of the 8V supply voltage", Some("volts")),
        ro("Volt12", Float, "VOL:12V", "Actual value of the 12V supply voltage", Some("volts")),
        // RF front end
        rw("LevelX", "LEV:X", "X input level", -60.0, -20.0, "dBm"),
        rw("LevelY", "LEV:Y", "Y input level", -60.0, -20.0, "dBm"),
        rw("LevelI", "LEV:I", "I input level", -50.0, -10.0, "dBm"),
        rw("PhaseShift", "PHA", "Phase shift of the LO signal", -180.0, 180.0, "degrees"),
        rw("PhaseOffsetX", "PHA:OFF:X", "Phase offset of the LO signal for X signal", -180.0, 180.0, "degrees"),
        rw("PhaseOffsetY", "PHA:OFF:Y", "Phase offset of the LO signal for Y signal", -180.0, 180.0, "degrees"),
        rw("PhaseOffsetIT", "PHA:OFF:IT", "Phase offset of the LO signal for IT signal", -180.0, 180.0, "degrees"),
        rw("PhaseOffsetIL", "PHA:OFF:IL", "Phase offset of the LO signal for IL signal", -180.0, 180.0, "degrees"),
        rw("PhaseClock1", "PHA:CLO:1", "MC phase shift clk1 output", -180.0, 180.0, "degrees"),
        rw("PhaseClock2", "PHA:CLO:2", "MC phase shift clk2 output", -180.0, 180.0, "degrees"),
        rw("PhaseClock3", "PHA:CLO:3", "MC phase shift clk3 output", -180.0, 180.0, "degrees"),
        rw("PhaseClock4", "PHA:CLO:4", "MC phase shift clk4 output", -180.0, 180.0, "degrees"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let schema = AttributeSchema::libera_bbfe();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.len(), 26);
    }

    #[test]
    fn test_lookup_known_and_unknown() {
        let schema = AttributeSchema::libera_bbfe();
        let spec = schema.lookup("Temperature").unwrap();
        assert_eq!(spec.read_keyword, "TEM:INS");
        assert_eq!(spec.value_type, ValueType::Float);
        assert!(!spec.is_writable());

        let err = schema.lookup("Nope").unwrap_err();
        assert!(matches!(err, BridgeError::UnknownAttribute(name) if name == "Nope"));
    }

    #[test]
    fn test_read_only_and_writable_split() {
        let schema = AttributeSchema::libera_bbfe();
        let writable: Vec<_> = schema.iter().filter(|s| s.is_writable()).collect();
        assert_eq!(writable.len(), 17);
        assert!(!schema.lookup("FanSpeed").unwrap().is_writable());
        let clock = schema.lookup("PhaseClock1").unwrap();
        assert_eq!(clock.write_keyword.as_deref(), Some("PHA:CLO:1"));
        assert_eq!(clock.bounds(), Some((-180.0, 180.0)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = AttributeSchema::new(vec![
            AttributeSpec::new("A", ValueType::Integer, "A:A"),
            AttributeSpec::new("A", ValueType::Float, "A:B"),
        ]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("duplicate attribute name 'A'"));
    }

    #[test]
    fn test_empty_read_keyword_rejected() {
        let result = AttributeSchema::new(vec![AttributeSpec::new("A", ValueType::Integer, " ")]);
        assert!(matches!(result, Err(BridgeError::InvalidSchema(_))));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let result = AttributeSchema::new(vec![
            AttributeSpec::new("A", ValueType::Integer, "A").with_range(10.0, 1.0)
        ]);
        assert!(result.unwrap_err().to_string().contains("min 10 > max 1"));
    }

    #[test]
    fn test_check_value_bounds_and_types() {
        let schema = AttributeSchema::libera_bbfe();
        let level = schema.lookup("LevelX").unwrap();
        assert!(level.check_value(&TypedValue::Integer(-40)).is_ok());
        assert!(level.check_value(&TypedValue::Integer(-60)).is_ok());
        assert!(matches!(
            level.check_value(&TypedValue::Integer(-10)),
            Err(BridgeError::OutOfRange { .. })
        ));
        assert!(matches!(
            level.check_value(&TypedValue::Float(-40.5)),
            Err(BridgeError::TypeMismatch { expected: ValueType::Integer, .. })
        ));

        let float = AttributeSpec::new("F", ValueType::Float, "F").writable_as("F");
        assert!(float.check_value(&TypedValue::Integer(3)).is_ok());
        assert!(float.check_value(&"three".into()).is_err());
    }

    #[test]
    fn test_typed_value_wire_text() {
        assert_eq!(TypedValue::Integer(-20).to_string(), "-20");
        assert_eq!(TypedValue::Float(1.5).to_string(), "1.5");
        assert_eq!(TypedValue::from("OFF").to_string(), "OFF");
    }
}
