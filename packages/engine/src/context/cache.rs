//! Named result cache shared by the blocks of one execution context.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use iosp_core::AnyResponse;

/// Responses of named blocks, keyed by block name.
///
/// The first response cached under a name is kept; later blocks reusing the
/// name never overwrite it.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: HashMap<String, AnyResponse>,
}

impl ResponseCache {
    /// Stores `response` under `name` unless the name is missing, blank or
    /// already taken. Returns whether the response was stored.
    pub(crate) fn add(&mut self, name: Option<&str>, response: &AnyResponse) -> bool {
        let Some(name) = name.filter(|n| !n.trim().is_empty()) else {
            return false;
        };
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_owned(), response.clone());
        true
    }

    /// Single payload cached under `name`, read as `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name)?.data::<T>()
    }

    /// List payload cached under `name`, read as a `Vec<T>`.
    #[must_use]
    pub fn get_list<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<Vec<T>>> {
        self.entries.get(name)?.list::<T>()
    }

    /// Payload of member `index` of the concurrency group cached under `name`.
    #[must_use]
    pub fn get_parallel_result_by_index<T: Any + Send + Sync>(
        &self,
        name: &str,
        index: usize,
    ) -> Option<Arc<T>> {
        self.entries.get(name)?.member::<T>(index)
    }

    /// The cached response itself, whatever its shape.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&AnyResponse> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use iosp_core::{ListResponse, Response, TypedResponse};

    use super::*;

    #[test]
    fn first_write_wins() {
        let mut cache = ResponseCache::default();
        assert!(cache.add(Some("total"), &TypedResponse::success(10_u32).into()));
        assert!(!cache.add(Some("total"), &TypedResponse::success(99_u32).into()));

        assert_eq!(cache.get::<u32>("total").as_deref(), Some(&10));
        assert_eq!(cache.get::<u32>("total").as_deref(), Some(&10));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn blank_and_missing_names_are_not_cached() {
        let mut cache = ResponseCache::default();
        let resp: AnyResponse = Response::success().into();
        assert!(!cache.add(None, &resp));
        assert!(!cache.add(Some(""), &resp));
        assert!(!cache.add(Some("  \t"), &resp));
        assert!(cache.is_empty());
    }

    #[test]
    fn lookups_respect_shape_and_type() {
        let mut cache = ResponseCache::default();
        cache.add(Some("ids"), &ListResponse::success(vec![4_u64, 5]).into());
        cache.add(Some("name"), &TypedResponse::success("ada".to_string()).into());

        assert_eq!(cache.get_list::<u64>("ids").as_deref(), Some(&vec![4, 5]));
        assert!(cache.get::<u64>("ids").is_none());
        assert!(cache.get::<u64>("name").is_none());
        assert_eq!(cache.get::<String>("name").as_deref().map(String::as_str), Some("ada"));
        assert!(cache.get::<String>("missing").is_none());

        let mut names: Vec<_> = cache.names().collect();
        names.sort_unstable();
        assert_eq!(names, ["ids", "name"]);
    }

    #[test]
    fn group_members_are_indexed() {
        let mut cache = ResponseCache::default();
        let group = AnyResponse::group(
            Response::success(),
            vec![
                Some(TypedResponse::success(1_i32).into()),
                None,
                Some(TypedResponse::success(3_i32).into()),
            ],
        );
        cache.add(Some("fan"), &group);

        assert_eq!(cache.get_parallel_result_by_index::<i32>("fan", 0).as_deref(), Some(&1));
        assert!(cache.get_parallel_result_by_index::<i32>("fan", 1).is_none());
        assert_eq!(cache.get_parallel_result_by_index::<i32>("fan", 2).as_deref(), Some(&3));
        assert!(cache.get_parallel_result_by_index::<i32>("fan", 7).is_none());
        assert!(cache.raw("fan").is_some_and(AnyResponse::is_group));
    }
}
