//! 查询模型
//!
//! 谓词以表达式树（`Filter`）的形式交给持久化会话求值，而不是在进程内用闭包过滤，
//! 这样任何关系型后端都可以把它翻译成自己的查询语言。
//! `Query` 是会话层看到的完整查询（实体类型、过滤、预加载关系、排序与分页）。

mod filter;
mod request;

pub use filter::Filter;
pub use request::{Query, SortDirection};
