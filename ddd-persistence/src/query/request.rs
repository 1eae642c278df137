use super::Filter;
use super::filter::compare_values;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// 会话层查询
///
/// 由仓储构建，软删除过滤条件已经注入到 `filter` 中；会话只负责求值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    entity_type: String,
    filter: Filter,
    includes: Vec<String>,
    order_by: Vec<(String, SortDirection)>,
    skip: Option<usize>,
    take: Option<usize>,
}

impl Query {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter: Filter::All,
            includes: Vec::new(),
            order_by: Vec::new(),
            skip: None,
            take: None,
        }
    }

    /// 追加过滤条件（与已有条件 AND 组合）
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    /// 预加载的关系名
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.includes.push(relation.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn filter_expr(&self) -> &Filter {
        &self.filter
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn ordering(&self) -> &[(String, SortDirection)] {
        &self.order_by
    }

    pub fn skip_count(&self) -> Option<usize> {
        self.skip
    }

    pub fn take_count(&self) -> Option<usize> {
        self.take
    }

    /// 在进程内对行集合应用过滤、排序与分页（供内存会话使用）
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut matched: Vec<Value> = rows
            .into_iter()
            .filter(|row| self.filter.matches(row))
            .collect();

        if !self.order_by.is_empty() {
            matched.sort_by(|a, b| self.compare_rows(a, b));
        }

        matched
            .into_iter()
            .skip(self.skip.unwrap_or(0))
            .take(self.take.unwrap_or(usize::MAX))
            .collect()
    }

    fn compare_rows(&self, a: &Value, b: &Value) -> Ordering {
        for (field, direction) in &self.order_by {
            let ord = compare_values(
                a.get(field).unwrap_or(&Value::Null),
                b.get(field).unwrap_or(&Value::Null),
            )
            .unwrap_or(Ordering::Equal);

            let ord = match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };

            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}
