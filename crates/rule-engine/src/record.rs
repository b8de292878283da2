//! 记录字段访问
//!
//! 引擎只能通过能力表（字段名 → getter）读取记录，不存在按名称任意调用方法的路径。
//! 类型化记录实现 [`Accessible`] 并在进程启动时注册一次访问器表；
//! 以 JSON 承载的记录使用 [`JsonRecord`]。

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Result, RuleError};

/// 字段值
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 转为数值，失败返回 None
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 时间类值转为 UTC 时间点
    ///
    /// 文本只接受 RFC 3339 时间戳；其余文本不视为时间。
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(*t),
            Self::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            Self::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write_float(f, *x),
            Self::Text(s) => f.write_str(s),
            Self::Time(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// 整数值的浮点数保留一位小数（`12.0`），与 JSON 文本保持一致
fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        write!(f, "{:.1}", x)
    } else {
        write!(f, "{}", x)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// JSON 值转换。字符串保持原文，时间解析延迟到 [`FieldValue::as_time`]。
impl From<&Value> for FieldValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// 可被引擎读取的记录
pub trait Record {
    /// 记录标识，仅用于日志
    fn record_id(&self) -> String;

    /// 通过能力表读取字段
    fn read(&self, field: &str) -> Result<FieldValue>;

    /// 通过能力表获取一跳关联。`Ok(None)` 表示关联为空。
    fn association(&self, name: &str) -> Result<Option<&dyn Record>>;
}

pub type Getter<R> = fn(&R) -> Result<FieldValue>;
pub type AssociationGetter<R> = fn(&R) -> Option<&dyn Record>;

/// 访问器能力表：字段名 → 类型化 getter
pub struct AccessorTable<R: 'static> {
    fields: HashMap<&'static str, Getter<R>>,
    associations: HashMap<&'static str, AssociationGetter<R>>,
}

impl<R: 'static> AccessorTable<R> {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
            associations: HashMap::new(),
        }
    }

    /// 注册字段访问器
    pub fn field(mut self, name: &'static str, getter: Getter<R>) -> Self {
        self.fields.insert(name, getter);
        self
    }

    /// 注册关联访问器
    pub fn association(mut self, name: &'static str, getter: AssociationGetter<R>) -> Self {
        self.associations.insert(name, getter);
        self
    }

    pub fn getter(&self, name: &str) -> Option<Getter<R>> {
        self.fields.get(name).copied()
    }

    pub fn association_getter(&self, name: &str) -> Option<AssociationGetter<R>> {
        self.associations.get(name).copied()
    }
}

impl<R: 'static> Default for AccessorTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// 以静态访问器表暴露字段的类型化记录
///
/// ```ignore
/// static ACCESSORS: LazyLock<AccessorTable<Contact>> = LazyLock::new(|| {
///     AccessorTable::new().field("email", |c| Ok(c.email.clone().into()))
/// });
///
/// impl Accessible for Contact {
///     fn accessors() -> &'static AccessorTable<Self> { &ACCESSORS }
///     fn identifier(&self) -> String { self.id.to_string() }
/// }
/// ```
pub trait Accessible: Sized + 'static {
    fn accessors() -> &'static AccessorTable<Self>;

    fn identifier(&self) -> String;
}

impl<T: Accessible> Record for T {
    fn record_id(&self) -> String {
        self.identifier()
    }

    fn read(&self, field: &str) -> Result<FieldValue> {
        let getter = T::accessors()
            .getter(field)
            .ok_or_else(|| RuleError::extraction(field, "no accessor registered"))?;
        getter(self)
    }

    fn association(&self, name: &str) -> Result<Option<&dyn Record>> {
        let getter = T::accessors()
            .association_getter(name)
            .ok_or_else(|| RuleError::extraction(name, "no association registered"))?;
        Ok(getter(self))
    }
}

/// JSON 承载的记录
///
/// 顶层对象的键即字段；值为对象的键同时可作为一跳关联访问。
#[derive(Debug, Clone, Default)]
pub struct JsonRecord {
    data: Value,
    associations: HashMap<String, JsonRecord>,
}

impl JsonRecord {
    pub fn new(data: Value) -> Self {
        let associations = match &data {
            Value::Object(map) => map
                .iter()
                .filter(|(_, v)| v.is_object())
                .map(|(k, v)| (k.clone(), JsonRecord::new(v.clone())))
                .collect(),
            _ => HashMap::new(),
        };
        Self { data, associations }
    }

    /// 从 JSON 字符串创建
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let data: Value = serde_json::from_str(json)?;
        Ok(Self::new(data))
    }

    /// 获取底层数据
    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl Record for JsonRecord {
    fn record_id(&self) -> String {
        match self.data.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn read(&self, field: &str) -> Result<FieldValue> {
        let map = self
            .data
            .as_object()
            .ok_or_else(|| RuleError::extraction(field, "record is not an object"))?;
        map.get(field)
            .map(FieldValue::from)
            .ok_or_else(|| RuleError::extraction(field, "no such field"))
    }

    fn association(&self, name: &str) -> Result<Option<&dyn Record>> {
        if let Some(child) = self.associations.get(name) {
            return Ok(Some(child as &dyn Record));
        }
        match self.data.get(name) {
            Some(Value::Null) => Ok(None),
            Some(_) => Err(RuleError::extraction(name, "value is not an association")),
            None => Err(RuleError::extraction(name, "no such association")),
        }
    }
}

/// 读取字段，访问器内部 panic 也按读取失败处理
pub(crate) fn read_guarded(record: &dyn Record, field: &str) -> Result<FieldValue> {
    panic::catch_unwind(AssertUnwindSafe(|| record.read(field)))
        .unwrap_or_else(|_| Err(RuleError::extraction(field, "accessor panicked")))
}

/// 获取关联，访问器内部 panic 也按读取失败处理
pub(crate) fn association_guarded<'a>(
    record: &'a dyn Record,
    name: &str,
) -> Result<Option<&'a dyn Record>> {
    panic::catch_unwind(AssertUnwindSafe(|| record.association(name)))
        .unwrap_or_else(|_| Err(RuleError::extraction(name, "association accessor panicked")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::LazyLock;

    struct Person {
        id: i64,
        email: String,
        age: Option<i64>,
    }

    static PERSON_ACCESSORS: LazyLock<AccessorTable<Person>> = LazyLock::new(|| {
        AccessorTable::<Person>::new()
            .field("email", |p| Ok(p.email.as_str().into()))
            .field("age", |p| Ok(p.age.into()))
            .field("status", |_| panic!("status getter exploded"))
    });

    impl Accessible for Person {
        fn accessors() -> &'static AccessorTable<Self> {
            &PERSON_ACCESSORS
        }

        fn identifier(&self) -> String {
            self.id.to_string()
        }
    }

    fn person() -> Person {
        Person {
            id: 7,
            email: "a@x.com".to_string(),
            age: None,
        }
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::Int(10115).to_string(), "10115");
        assert_eq!(FieldValue::Bool(true).to_string(), "true");
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(FieldValue::Time(t).to_string(), "2024-01-15T10:00:00Z");
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(FieldValue::Date(d).to_string(), "2024-02-29");
    }

    #[test]
    fn test_numeric_cast() {
        assert_eq!(FieldValue::from(" 42 ").as_number(), Some(42.0));
        assert_eq!(FieldValue::Int(3).as_number(), Some(3.0));
        assert_eq!(FieldValue::from("abc").as_number(), None);
        assert_eq!(FieldValue::Bool(true).as_number(), None);
    }

    #[test]
    fn test_accessible_record_reads_registered_fields() {
        let p = person();
        assert_eq!(p.record_id(), "7");
        assert_eq!(p.read("email").unwrap(), FieldValue::from("a@x.com"));
        assert_eq!(p.read("age").unwrap(), FieldValue::Null);
        assert!(p.read("password").is_err());
        assert!(p.association("organization").is_err());
    }

    #[test]
    fn test_guarded_read_catches_panics() {
        let p = person();
        let err = read_guarded(&p, "status").unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_json_record_fields_and_associations() {
        let record = JsonRecord::new(json!({
            "id": 12,
            "email": "x@SPAM.com",
            "created_at": "2024-01-15T10:00:00Z",
            "organization": {"name": "ACME"},
            "campaign": null
        }));

        assert_eq!(record.record_id(), "12");
        assert_eq!(
            record.read("created_at").unwrap(),
            FieldValue::from("2024-01-15T10:00:00Z")
        );
        assert!(record.read("missing").is_err());

        let org = record.association("organization").unwrap().unwrap();
        assert_eq!(org.read("name").unwrap(), FieldValue::from("ACME"));
        assert!(record.association("campaign").unwrap().is_none());
        assert!(record.association("email").is_err());
        assert!(record.association("address").is_err());
    }

    #[test]
    fn test_json_timestamp_keeps_original_text() {
        let record = JsonRecord::new(json!({"created_at": "2024-01-15T01:00:00+02:00"}));
        let value = record.read("created_at").unwrap();

        assert_eq!(value.to_string(), "2024-01-15T01:00:00+02:00");
        assert_eq!(
            value.as_time(),
            Some(Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap())
        );
        assert_eq!(FieldValue::from("not a time").as_time(), None);
    }

    #[test]
    fn test_float_rendering_keeps_fraction() {
        assert_eq!(FieldValue::Float(12.0).to_string(), "12.0");
        assert_eq!(FieldValue::Float(-3.0).to_string(), "-3.0");
        assert_eq!(FieldValue::Float(12.5).to_string(), "12.5");
        assert_eq!(FieldValue::Int(12).to_string(), "12");

        let record = JsonRecord::new(json!({"amount": 12.0}));
        assert_eq!(record.read("amount").unwrap().to_string(), "12.0");
    }
}
