use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::components::{
    CharacterBody, Collider, ExternalBody, Position3D, Rotation3D, Scale3D, SceneLink, TriggerArea, Velocity3D,
};
use crate::ecs::GlobalTransform;
use crate::ecs::component::BoxedComponent;
use crate::error::SceneError;
use crate::math::Transform;

use super::packed::PackedComponent;

type SerializeFn = fn(&dyn Any) -> Option<Result<serde_json::Value, serde_json::Error>>;
type DeserializeFn = fn(&serde_json::Value) -> Result<BoxedComponent, serde_json::Error>;

struct ComponentFns {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
    name: String,
}

/// Maps component types to serialize/deserialize function pointers and a
/// stable document name.
///
/// Components of unregistered types are left out of packed scenes. Types
/// marked with [`ignore`](Self::ignore) are runtime-only and skipped
/// silently.
pub struct ComponentRegistry {
    by_type_id: HashMap<TypeId, ComponentFns>,
    by_name: HashMap<String, TypeId>,
    ignored: HashSet<TypeId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            by_type_id: HashMap::new(),
            by_name: HashMap::new(),
            ignored: HashSet::new(),
        }
    }

    /// A registry knowing every built-in component.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<Transform>();
        registry.register::<Position3D>();
        registry.register::<Rotation3D>();
        registry.register::<Scale3D>();
        registry.register::<Velocity3D>();
        registry.register::<Collider>();
        registry.register::<CharacterBody>();
        registry.register::<TriggerArea>();
        registry.register::<SceneLink>();
        registry.ignore::<GlobalTransform>();
        registry.ignore::<ExternalBody>();
        registry
    }

    /// Register `T` under its short type name (`Transform`, `Vec<Item>`).
    pub fn register<T>(&mut self)
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.register_as::<T>(short_type_name(std::any::type_name::<T>()));
    }

    /// Register `T` under an explicit name. Re-registering a name moves it
    /// to the new type.
    pub fn register_as<T>(&mut self, name: impl Into<String>)
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let name = name.into();
        let type_id = TypeId::of::<T>();
        if let Some(previous) = self.by_name.get(&name).copied() {
            if previous != type_id {
                log::warn!("component name `{name}` re-registered to a different type");
                self.by_type_id.remove(&previous);
            }
        }
        if let Some(old) = self.by_type_id.get(&type_id) {
            self.by_name.remove(&old.name);
        }

        let fns = ComponentFns {
            serialize: |any| {
                let value = any.downcast_ref::<T>()?;
                Some(serde_json::to_value(value))
            },
            deserialize: |json| {
                let value = T::deserialize(json)?;
                Ok(Box::new(value))
            },
            name: name.clone(),
        };
        self.by_type_id.insert(type_id, fns);
        self.by_name.insert(name, type_id);
        self.ignored.remove(&type_id);
    }

    /// Skip `T` when packing without warning about it.
    pub fn ignore<T: 'static>(&mut self) {
        self.ignored.insert(TypeId::of::<T>());
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.by_type_id.contains_key(&TypeId::of::<T>())
    }

    pub fn is_ignored(&self, type_id: TypeId) -> bool {
        self.ignored.contains(&type_id)
    }

    pub fn name_of(&self, type_id: TypeId) -> Option<&str> {
        self.by_type_id.get(&type_id).map(|f| f.name.as_str())
    }

    pub fn type_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Registered names, sorted.
    pub fn component_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Snapshot one component by value. `None` if the type is not registered.
    pub(crate) fn pack(
        &self,
        type_id: TypeId,
        value: &dyn Any,
    ) -> Option<Result<PackedComponent, SceneError>> {
        let fns = self.by_type_id.get(&type_id)?;
        let data = (fns.serialize)(value)?;
        Some(
            data.map(|data| PackedComponent {
                kind: fns.name.clone(),
                data,
            })
            .map_err(SceneError::from),
        )
    }

    /// Rebuild one component from its packed form.
    pub(crate) fn unpack(&self, packed: &PackedComponent) -> Result<(TypeId, BoxedComponent), SceneError> {
        let (type_id, fns) = self
            .type_of(&packed.kind)
            .and_then(|t| Some((t, self.by_type_id.get(&t)?)))
            .ok_or_else(|| SceneError::UnknownComponent(packed.kind.clone()))?;
        let value = (fns.deserialize)(&packed.data)
            .map_err(|err| SceneError::MalformedDocument(format!("component `{}`: {err}", packed.kind)))?;
        Ok((type_id, value))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.component_names())
            .field("ignored", &self.ignored.len())
            .finish()
    }
}

/// `alloc::vec::Vec<game::Item>` → `Vec<Item>`.
fn short_type_name(full: &str) -> String {
    if let Some(angle) = full.find('<') {
        let prefix = &full[..angle];
        let short_prefix = prefix.rsplit("::").next().unwrap_or(prefix);
        let inner = &full[angle + 1..full.len() - 1];
        let short_inner = inner
            .split(", ")
            .map(short_type_name)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{short_prefix}<{short_inner}>")
    } else {
        full.rsplit("::").next().unwrap_or(full).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Health(u32);

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Inventory(Vec<String>);

    #[test]
    fn builtins_are_registered_by_short_name() {
        let registry = ComponentRegistry::with_builtins();
        assert_eq!(registry.type_of("Transform"), Some(TypeId::of::<Transform>()));
        assert_eq!(registry.name_of(TypeId::of::<Collider>()), Some("Collider"));
        assert!(registry.is_ignored(TypeId::of::<GlobalTransform>()));
        assert!(!registry.is_registered::<ExternalBody>());
    }

    #[test]
    fn pack_and_unpack_one_component() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>();

        let packed = registry
            .pack(TypeId::of::<Health>(), &Health(42))
            .unwrap()
            .unwrap();
        assert_eq!(packed.kind, "Health");
        assert_eq!(packed.data, serde_json::json!(42));

        let (type_id, boxed) = registry.unpack(&packed).unwrap();
        assert_eq!(type_id, TypeId::of::<Health>());
        assert_eq!(boxed.downcast_ref::<Health>(), Some(&Health(42)));
    }

    #[test]
    fn unknown_kind_and_bad_payload() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>();

        let unknown = PackedComponent {
            kind: "Mana".into(),
            data: serde_json::json!(1),
        };
        assert!(matches!(registry.unpack(&unknown), Err(SceneError::UnknownComponent(k)) if k == "Mana"));

        let bad = PackedComponent {
            kind: "Health".into(),
            data: serde_json::json!("lots"),
        };
        assert!(matches!(registry.unpack(&bad), Err(SceneError::MalformedDocument(_))));
    }

    #[test]
    fn explicit_names_replace_short_names() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>();
        registry.register_as::<Health>("game.health");
        assert_eq!(registry.type_of("Health"), None);
        assert_eq!(registry.component_names(), vec!["game.health"]);
    }

    #[test]
    fn short_names() {
        assert_eq!(short_type_name("game::Health"), "Health");
        assert_eq!(short_type_name("alloc::vec::Vec<game::Item>"), "Vec<Item>");
        assert_eq!(
            short_type_name("std::collections::HashMap<alloc::string::String, game::Item>"),
            "HashMap<String, Item>"
        );
        assert_eq!(std::any::type_name::<Inventory>().rsplit("::").next(), Some("Inventory"));
    }
}
