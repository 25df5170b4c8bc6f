mod basic;
#[cfg(feature = "sqlite")]
mod sql;
