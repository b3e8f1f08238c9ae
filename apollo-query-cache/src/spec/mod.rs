//! Selection tree helpers shared by the cache engines.

mod cache_key;
mod fragments;
mod simplify;

use apollo_compiler::Name;

pub use self::cache_key::cache_key;
pub use self::cache_key::result_key;
pub(crate) use self::fragments::Fragments;
pub use self::simplify::simplify;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

pub(crate) const TYPENAME: &str = "__typename";

/// Whether a fragment with `type_condition` may apply to the cached `context`.
///
/// Without a schema the only evidence is a cached `__typename`; when either side is
/// missing the fragment is assumed to apply.
pub(crate) fn type_condition_applies(type_condition: Option<&Name>, context: &Value) -> bool {
    match (type_condition, context.member(TYPENAME).and_then(Value::as_str)) {
        (Some(condition), Some(typename)) => condition.as_str() == typename,
        _ => true,
    }
}
