use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::ops::Not;
use uuid::Uuid;

/// 过滤表达式
///
/// 字段以列名（可用 `.` 访问嵌套对象）引用，值为 JSON 标量。
/// 组合方式与规约模式一致：`and` / `or` / `!`。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// 恒真
    #[default]
    All,
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    /// 字符串包含
    Contains { field: String, needle: String },
    IsNull { field: String },
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_in<V>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull {
            field: field.into(),
        }
    }

    /// 按标识过滤
    pub fn id(field: impl Into<String>, id: Uuid) -> Self {
        Self::eq(field, id.to_string())
    }

    /// 时间比较的便捷写法（时间以 RFC 3339 形式比较）
    pub fn after(field: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::gt(field, at.to_rfc3339())
    }

    pub fn before(field: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::lt(field, at.to_rfc3339())
    }

    /// AND 组合（扁平化，`All` 为单位元）
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, f) | (f, Self::All) => f,
            (Self::And { mut filters }, Self::And { filters: rhs }) => {
                filters.extend(rhs);
                Self::And { filters }
            }
            (Self::And { mut filters }, f) => {
                filters.push(f);
                Self::And { filters }
            }
            (f, Self::And { mut filters }) => {
                filters.insert(0, f);
                Self::And { filters }
            }
            (l, r) => Self::And {
                filters: vec![l, r],
            },
        }
    }

    /// OR 组合（扁平化）
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Or { mut filters }, Self::Or { filters: rhs }) => {
                filters.extend(rhs);
                Self::Or { filters }
            }
            (Self::Or { mut filters }, f) => {
                filters.push(f);
                Self::Or { filters }
            }
            (l, r) => Self::Or {
                filters: vec![l, r],
            },
        }
    }

    /// 对一行（JSON 对象）求值，供进程内会话实现使用
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => values_equal(lookup(row, field), value),
            Self::Ne { field, value } => !values_equal(lookup(row, field), value),
            Self::Gt { field, value } => {
                compare_values(lookup(row, field), value) == Some(Ordering::Greater)
            }
            Self::Gte { field, value } => matches!(
                compare_values(lookup(row, field), value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt { field, value } => {
                compare_values(lookup(row, field), value) == Some(Ordering::Less)
            }
            Self::Lte { field, value } => matches!(
                compare_values(lookup(row, field), value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In { field, values } => {
                let actual = lookup(row, field);
                values.iter().any(|v| values_equal(actual, v))
            }
            Self::Contains { field, needle } => lookup(row, field)
                .as_str()
                .is_some_and(|s| s.contains(needle.as_str())),
            Self::IsNull { field } => lookup(row, field).is_null(),
            Self::And { filters } => filters.iter().all(|f| f.matches(row)),
            Self::Or { filters } => filters.iter().any(|f| f.matches(row)),
            Self::Not { filter } => !filter.matches(row),
        }
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Self::Output {
        match self {
            Self::Not { filter } => *filter,
            f => Self::Not {
                filter: Box::new(f),
            },
        }
    }
}

static NULL: Value = Value::Null;

// 按 `a.b.c` 形式的路径取值，缺失视为 null
fn lookup<'a>(row: &'a Value, path: &str) -> &'a Value {
    path.split('.')
        .try_fold(row, |current, key| current.get(key))
        .unwrap_or(&NULL)
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    actual == expected || compare_values(actual, expected) == Some(Ordering::Equal)
}

/// 比较两个 JSON 标量；类型不兼容时返回 None
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => {
            // 时间戳的小数位数可能不同，按时间语义比较
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => Some(x.cmp(&y)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn row() -> Value {
        json!({
            "id": "0190c0de-0000-7000-8000-000000000001",
            "name": "Widget",
            "qty": 7,
            "price": 2.5,
            "is_deleted": false,
            "created_at": "2026-01-02T03:04:05.123456Z",
            "customer": { "tier": "gold" },
            "notes": null
        })
    }

    #[test]
    fn scalar_comparisons() {
        let r = row();
        assert!(Filter::eq("name", "Widget").matches(&r));
        assert!(Filter::ne("name", "Gadget").matches(&r));
        assert!(Filter::gt("qty", 5).matches(&r));
        assert!(Filter::gte("qty", 7).matches(&r));
        assert!(!Filter::lt("qty", 7).matches(&r));
        assert!(Filter::lte("price", 2.5).matches(&r));
        assert!(Filter::eq("qty", 7.0).matches(&r));
        assert!(Filter::eq("is_deleted", false).matches(&r));
    }

    #[test]
    fn nested_missing_and_null_fields() {
        let r = row();
        assert!(Filter::eq("customer.tier", "gold").matches(&r));
        assert!(Filter::is_null("notes").matches(&r));
        assert!(Filter::is_null("customer.missing").matches(&r));
        assert!(!Filter::gt("missing", 1).matches(&r));
    }

    #[test]
    fn timestamps_compare_by_time_not_text() {
        let r = row();
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(Filter::after("created_at", at).matches(&r));
        assert!(Filter::before("created_at", at + Duration::seconds(1)).matches(&r));
    }

    #[test]
    fn combinators_flatten_and_negate() {
        let r = row();
        let f = Filter::eq("name", "Widget")
            .and(Filter::gt("qty", 1))
            .and(Filter::All);
        assert!(matches!(&f, Filter::And { filters } if filters.len() == 2));
        assert!(f.matches(&r));

        let g = Filter::eq("name", "Gadget").or(Filter::is_in("qty", [1, 7]));
        assert!(g.matches(&r));
        assert!(!(!g.clone()).matches(&r));
        assert_eq!(!!g.clone(), g);

        assert!(Filter::contains("name", "idg").matches(&r));
        assert_eq!(Filter::All.or(Filter::eq("qty", 0)), Filter::All);
    }
}
