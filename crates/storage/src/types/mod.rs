//! Core types shared by every backend.
//!
//! - [`Resource`], [`ObjectMeta`], [`TypeMeta`], [`ResourceList`] - stored objects
//! - [`Selector`], [`Requirement`], [`Operator`] - label and field selectors
//! - [`SelectionPredicate`], [`FieldPath`] - list filters
//! - [`PageRequest`], [`build_page`] - pagination
//!
//! # Example
//!
//! ```
//! use apimaster_storage::types::{build_page, PageRequest, SelectionPredicate};
//!
//! let predicate = SelectionPredicate::parse(
//!     "tier=prod",
//!     "metadata.name!=canary",
//!     Some(PageRequest::new(2, 10)),
//! )
//! .unwrap();
//! assert_eq!(predicate.requirements().len(), 2);
//!
//! let window = build_page(25, predicate.page.as_ref());
//! assert_eq!(window.skip, 10);
//! ```

mod object;
mod pagination;
mod predicate;
mod selector;

pub use object::{ListMeta, ObjectMeta, Resource, ResourceList, TypeMeta, resource_key};
pub use pagination::{PageRequest, PageWindow, build_page};
pub use predicate::{FieldPath, FieldRequirement, SelectionPredicate};
pub use selector::{Operator, Requirement, Selector};
