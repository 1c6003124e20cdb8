// ==========================================
// 仓库波次排程引擎 - 行映射辅助
// ==========================================
// 职责: 数据库文本枚举 → 领域枚举（未知值视为数据损坏，不静默默认）
// ==========================================

use rusqlite::types::Type;

#[derive(Debug)]
struct UnknownEnumValue {
    column: &'static str,
    value: String,
}

impl std::fmt::Display for UnknownEnumValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "未知枚举值: {}='{}'", self.column, self.value)
    }
}

impl std::error::Error for UnknownEnumValue {}

/// 解析文本列为领域枚举
pub(crate) fn parse_enum_column<T>(
    idx: usize,
    column: &'static str,
    raw: String,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(UnknownEnumValue { column, value: raw }),
        )
    })
}

/// 构造 `IN (?1, ?2, ...)` 占位符
pub(crate) fn in_placeholders(count: usize) -> String {
    (1..=count).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}
