//! 白名单
//!
//! 进程级只读查找表，是配置可表达能力的唯一来源。校验器和执行器查询同一份表，
//! 因此"能通过校验的"与"能被执行的"不会出现分歧。扩展能力只需在此新增一项。

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::operators::Operator;
use crate::transforms::{Format, Transformation};

/// 允许在配置中引用的字段（不含密钥、内部状态等敏感字段）
pub const ALLOWED_FIELDS: &[&str] = &[
    "id",
    "email",
    "first_name",
    "last_name",
    "name",
    "title",
    "company",
    "street",
    "postal_code",
    "city",
    "country",
    "phone",
    "ip_address",
    "user_agent",
    "message",
    "amount",
    "status",
    "source",
    "code",
    "created_at",
    "updated_at",
    "confirmed_at",
];

/// 允许作为两段式路径首段的关联
pub const ALLOWED_ASSOCIATIONS: &[&str] = &["organization", "campaign", "address", "contact"];

static ALLOW_LIST: LazyLock<AllowList> = LazyLock::new(AllowList::build);

/// 获取全局白名单
pub fn allow_list() -> &'static AllowList {
    &ALLOW_LIST
}

/// 白名单查找表
#[derive(Debug)]
pub struct AllowList {
    fields: HashSet<&'static str>,
    associations: HashSet<&'static str>,
    operators: HashMap<&'static str, Operator>,
    transformations: HashMap<&'static str, Transformation>,
    formats: HashMap<&'static str, Format>,
}

impl AllowList {
    fn build() -> Self {
        Self {
            fields: ALLOWED_FIELDS.iter().copied().collect(),
            associations: ALLOWED_ASSOCIATIONS.iter().copied().collect(),
            operators: Operator::ALL.iter().map(|op| (op.name(), *op)).collect(),
            transformations: Transformation::ALL
                .iter()
                .map(|t| (t.name(), *t))
                .collect(),
            formats: Format::ALL.iter().map(|f| (f.name(), *f)).collect(),
        }
    }

    pub fn is_field_allowed(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn is_association_allowed(&self, name: &str) -> bool {
        self.associations.contains(name)
    }

    pub fn operator(&self, name: &str) -> Option<Operator> {
        self.operators.get(name).copied()
    }

    pub fn transformation(&self, name: &str) -> Option<Transformation> {
        self.transformations.get(name).copied()
    }

    pub fn format(&self, name: &str) -> Option<Format> {
        self.formats.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_cover_every_variant() {
        let list = allow_list();
        for op in Operator::ALL {
            assert_eq!(list.operator(op.name()), Some(op));
        }
        for t in Transformation::ALL {
            assert_eq!(list.transformation(t.name()), Some(t));
        }
        for f in Format::ALL {
            assert_eq!(list.format(f.name()), Some(f));
        }
    }

    #[test]
    fn test_rejects_unknown_names() {
        let list = allow_list();
        assert!(list.is_field_allowed("postal_code"));
        assert!(!list.is_field_allowed("password_digest"));
        assert!(!list.is_field_allowed("destroy"));
        assert!(list.operator("eval").is_none());
        assert!(list.transformation("system").is_none());
        assert!(list.format("yaml").is_none());
        assert!(list.is_association_allowed("organization"));
        assert!(!list.is_association_allowed("users"));
    }
}
