//! 执行层：输入注入原语、元素定位与单步执行

pub mod driver;
pub mod executor;
pub mod lookup;

pub use driver::{InputDriver, OsaScriptDriver};
pub use executor::{ActionOutcome, ExecutorAdapter};
pub use lookup::{ElementLookup, LookupStrategy};
