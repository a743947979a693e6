//! Dialect dispatch macro.

/// Match a `DbPool` or `DbTransaction` value and run the same body for every
/// dialect, with that dialect's module in scope under the given alias.
///
/// # Example
///
/// ```ignore
/// dispatch!(DbPool, &pool, p, dialect => dialect::run(p, sql, params).await)
/// ```
macro_rules! dispatch {
    ($enum:ident, $value:expr, $inner:ident, $module:ident => $body:expr) => {
        match $value {
            $enum::Postgres($inner) => {
                use $crate::db::dialect::postgres as $module;
                $body
            }
            $enum::MySql($inner) => {
                use $crate::db::dialect::mysql as $module;
                $body
            }
            $enum::Sqlite($inner) => {
                use $crate::db::dialect::sqlite as $module;
                $body
            }
        }
    };
}

pub(crate) use dispatch;
