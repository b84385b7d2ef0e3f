//! Messages and their runtime identity.
//!
//! Any `'static` value that is `Debug + Send + Sync` can travel on a bus. The
//! bus identifies it by its concrete type, captured as a [`MessageType`].

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A unit of work dispatched through a bus.
///
/// Implemented for every eligible type; there is nothing to derive.
///
/// Call these methods on a `&dyn Message`, not on a smart pointer holding one,
/// otherwise the pointer type itself is reported.
pub trait Message: Any + fmt::Debug + Send + Sync {
    /// Returns `self` as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the runtime identity of this message.
    fn message_type(&self) -> MessageType;
}

impl<T> Message for T
where
    T: Any + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn message_type(&self) -> MessageType {
        MessageType::of::<T>()
    }
}

/// Runtime identity of a message type.
///
/// Equality and hashing only consider the [`TypeId`]; the name is carried for
/// errors, logs and records.
#[derive(Clone, Copy)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
}

impl MessageType {
    /// Returns the identity of `M`.
    pub fn of<M: Message>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: type_name::<M>(),
        }
    }

    /// The underlying type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, e.g. `shop::orders::CreateOrder`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, generic arguments included.
    ///
    /// `shop::orders::CreateOrder` becomes `CreateOrder` and
    /// `shop::Batch<shop::Item>` becomes `Batch<shop::Item>`.
    pub fn short_name(&self) -> &'static str {
        simple_name(self.name)
    }

    /// Returns `true` for language primitives, which can never be messages
    /// declared by a handler definition.
    pub fn is_primitive(&self) -> bool {
        const PRIMITIVES: &[&str] = &[
            "()",
            "bool",
            "char",
            "str",
            "&str",
            "alloc::string::String",
            "u8",
            "u16",
            "u32",
            "u64",
            "u128",
            "usize",
            "i8",
            "i16",
            "i32",
            "i64",
            "i128",
            "isize",
            "f32",
            "f64",
        ];
        PRIMITIVES.contains(&self.name)
    }
}

fn simple_name(full: &'static str) -> &'static str {
    let path_end = full.find('<').unwrap_or(full.len());
    match full[..path_end].rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageType").field(&self.name).finish()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CreateOrder;

    #[derive(Debug)]
    struct Batch<T>(#[allow(dead_code)] T);

    #[test]
    fn test_short_name_strips_module_path() {
        let ty = MessageType::of::<CreateOrder>();
        assert_eq!(ty.short_name(), "CreateOrder");
        assert!(ty.name().ends_with("::CreateOrder"));
    }

    #[test]
    fn test_short_name_keeps_generic_arguments() {
        let ty = MessageType::of::<Batch<CreateOrder>>();
        assert!(ty.short_name().starts_with("Batch<"));
        assert!(ty.short_name().ends_with("CreateOrder>"));
    }

    #[test]
    fn test_message_type_through_trait_object() {
        let msg: Box<dyn Message> = Box::new(CreateOrder);
        assert_eq!(msg.as_ref().message_type(), MessageType::of::<CreateOrder>());
        assert!(msg.as_ref().as_any().is::<CreateOrder>());
    }

    #[test]
    fn test_primitives_are_detected() {
        assert!(MessageType::of::<u32>().is_primitive());
        assert!(MessageType::of::<String>().is_primitive());
        assert!(!MessageType::of::<CreateOrder>().is_primitive());
    }
}
