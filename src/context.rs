//! Immutable, chainable request-scoped values.
//!
//! A [`Context`] is a persistent linked list: deriving a child with one more
//! value allocates a single node pointing at its parent and never touches the
//! parent, so a context can be handed down a middleware chain and every layer
//! only sees what was bound above it.
//!
//! ```rust
//! use contextual::Context;
//!
//! struct User(&'static str);
//!
//! let base = Context::background();
//! let child = base.with(User("fred")).with_value("theme", "dark");
//!
//! assert_eq!(child.get::<User>().map(|u| u.0), Some("fred"));
//! assert_eq!(child.value::<&str>("theme"), Some(&"dark"));
//! assert!(base.get::<User>().is_none());
//! ```

use std::{
    any::{Any, TypeId},
    borrow::Cow,
    fmt::{Debug, Formatter},
    sync::Arc,
};

#[derive(Debug, PartialEq, Eq)]
enum Key {
    Type(TypeId, &'static str),
    Name(Cow<'static, str>),
}

struct Node {
    key: Key,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

/// Immutable chain of request-scoped values
///
/// Values are stored either in a typed slot (keyed by their Rust type, see
/// [`with`](#method.with)) or under a string name (see
/// [`with_value`](#method.with_value)). The closest binding wins on lookup.
///
/// Cloning is one reference count increment. Two contexts are equal only if
/// they are the very same chain, which is what the request binder relies on
/// to hand back an already bound context.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

impl Context {
    /// The empty root context
    pub fn background() -> Self {
        Context { head: None }
    }

    /// Derive a child context storing `value` in the slot of its type
    ///
    /// Private types make unforgeable keys: code that cannot name the type
    /// cannot read or shadow the value.
    pub fn with<T: Any + Send + Sync>(&self, value: T) -> Context {
        self.push(Key::Type(TypeId::of::<T>(), std::any::type_name::<T>()), Arc::new(value))
    }

    /// Derive a child context storing `value` under `name`
    pub fn with_value<K, V>(&self, name: K, value: V) -> Context
    where
        K: Into<Cow<'static, str>>,
        V: Any + Send + Sync,
    {
        self.push(Key::Name(name.into()), Arc::new(value))
    }

    /// Look up the closest value stored in the slot of type `T`
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        let id = TypeId::of::<T>();
        self.find(|k| matches!(k, Key::Type(t, _) if *t == id))
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Look up the closest value stored under `name`
    ///
    /// Returns `None` if nothing is bound under `name` or if the closest
    /// binding holds a value of another type.
    pub fn value<V: Any + Send + Sync>(&self, name: &str) -> Option<&V> {
        self.find(|k| matches!(k, Key::Name(n) if n == name))
            .and_then(|v| v.downcast_ref::<V>())
    }

    /// Number of bindings in this chain, shadowed ones included
    pub fn depth(&self) -> usize {
        self.nodes().count()
    }

    fn push(&self, key: Key, value: Arc<dyn Any + Send + Sync>) -> Context {
        Context {
            head: Some(Arc::new(Node {
                key,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    fn find<F>(&self, matches: F) -> Option<&(dyn Any + Send + Sync)>
    where
        F: Fn(&Key) -> bool,
    {
        self.nodes().find(|n| matches(&n.key)).map(|n| n.value.as_ref())
    }

    fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(self.head.as_deref(), |n| n.parent.as_deref())
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for Context {}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for node in self.nodes() {
            match &node.key {
                Key::Type(_, name) => list.entry(name),
                Key::Name(name) => list.entry(name),
            };
        }
        list.finish()
    }
}

#[cfg(test)]
mod t {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct User(String);

    #[test]
    fn background_is_empty() {
        let c = Context::background();
        assert_eq!(c.depth(), 0);
        assert!(c.get::<User>().is_none());
        assert!(c.value::<String>("user").is_none());
    }

    #[test]
    fn child_does_not_mutate_parent() {
        let parent = Context::background().with_value("user", "fred");
        let child = parent.with_value("role", "admin");

        assert_eq!(parent.value::<&str>("role"), None);
        assert_eq!(child.value::<&str>("role"), Some(&"admin"));
        assert_eq!(child.value::<&str>("user"), Some(&"fred"));
        assert_eq!(parent.depth(), 1);
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn closest_binding_shadows() {
        let c = Context::background().with(User("fred".into())).with(User("bob".into()));
        assert_eq!(c.get::<User>(), Some(&User("bob".into())));

        let c = c.with_value("user", 1u32).with_value("user", 2u32);
        assert_eq!(c.value::<u32>("user"), Some(&2));
    }

    #[test]
    fn names_and_types_do_not_collide() {
        let c = Context::background().with(String::from("typed")).with_value("String", String::from("named"));
        assert_eq!(c.get::<String>().map(String::as_str), Some("typed"));
        assert_eq!(c.value::<String>("String").map(String::as_str), Some("named"));
    }

    #[test]
    fn wrong_type_under_name_is_none() {
        let c = Context::background().with_value("count", 3u8);
        assert_eq!(c.value::<u32>("count"), None);
    }

    #[test]
    fn equality_is_identity() {
        let a = Context::background().with_value("k", 1);
        let b = a.clone();
        let c = Context::background().with_value("k", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Context::background(), Context::default());
    }
}
