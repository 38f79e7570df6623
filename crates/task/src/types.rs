use crate::TaskError;
use hzn_core::Value;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;

/// Index of a type in the [`Universe`].
pub type TypeId = usize;
/// Index of an object in the [`Universe`].
pub type ObjectId = usize;

/// A named type in the rooted hierarchy.
///
/// The universe pre-seeds two roots, `object` and `enum`; every declared
/// type chains up to one of them through `super_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub super_type: Option<TypeId>,
    /// Objects declared directly on this type, in declaration order.
    pub objects: Vec<ObjectId>,
}

/// A concrete object of the universe.
///
/// Identity is the `(type, index-in-type)` pair; `value` embeds the object
/// into arithmetic as its index within the declaring type, stable for the
/// whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    pub type_id: TypeId,
    pub value: Value,
}

/// The typed object universe: the type hierarchy and every declared object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
    pub types: Vec<TypeDef>,
    pub objects: Vec<Object>,
    type_index: HashMap<String, TypeId>,
    object_index: HashMap<String, ObjectId>,
}

impl Universe {
    /// An empty universe with the pre-seeded `object` and `enum` roots.
    pub fn new() -> Self {
        let mut universe = Self::default();
        universe.add_root("object");
        universe.add_root("enum");
        universe
    }

    fn add_root(&mut self, name: &str) -> TypeId {
        let id = self.types.len();
        self.types.push(TypeDef {
            name: name.to_string(),
            super_type: None,
            objects: Vec::new(),
        });
        self.type_index.insert(name.to_string(), id);
        id
    }

    /// Declares a type under an existing supertype (the `object` root when
    /// none is given).
    pub fn declare_type(
        &mut self,
        name: &str,
        super_type: Option<&str>,
    ) -> Result<TypeId, TaskError> {
        let parent = match super_type {
            Some(parent) => self.type_id(parent)?,
            None => self.type_id("object")?,
        };
        let id = self.types.len();
        self.types.push(TypeDef {
            name: name.to_string(),
            super_type: Some(parent),
            objects: Vec::new(),
        });
        self.type_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declares an object of a type; its numeric value is its position
    /// within that type.
    pub fn declare_object(&mut self, name: &str, type_name: &str) -> Result<ObjectId, TaskError> {
        let type_id = self.type_id(type_name)?;
        let id = self.objects.len();
        let value = self.types[type_id].objects.len() as Value;
        self.objects.push(Object {
            name: name.to_string(),
            type_id,
            value,
        });
        self.types[type_id].objects.push(id);
        self.object_index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn type_id(&self, name: &str) -> Result<TypeId, TaskError> {
        self.type_index
            .get(name)
            .copied()
            .ok_or_else(|| TaskError::UndefinedReference {
                kind: "type",
                name: name.to_string(),
            })
    }

    pub fn object_id(&self, name: &str) -> Result<ObjectId, TaskError> {
        self.object_index
            .get(name)
            .copied()
            .ok_or_else(|| TaskError::UndefinedReference {
                kind: "object",
                name: name.to_string(),
            })
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id]
    }

    /// True if `sub` equals `sup` or chains up to it through supertypes.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == sup {
                return true;
            }
            current = self.types[id].super_type;
        }
        false
    }

    /// All objects satisfying a parameter of the given type: the type's own
    /// objects plus those of every transitive subtype, in declaration order.
    pub fn objects_of_type(&self, type_id: TypeId) -> Vec<ObjectId> {
        let mut result: Vec<ObjectId> = Vec::new();
        for (id, _) in self.types.iter().enumerate() {
            if self.is_subtype(id, type_id) {
                result.extend(self.types[id].objects.iter().copied());
            }
        }
        result.sort_unstable();
        result
    }

    /// Rebuilds the name lookup tables, e.g. after deserialization.
    pub fn reindex(&mut self) {
        self.type_index = self
            .types
            .iter()
            .enumerate()
            .map(|(id, t)| (t.name.clone(), id))
            .collect();
        self.object_index = self
            .objects
            .iter()
            .enumerate()
            .map(|(id, o)| (o.name.clone(), id))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Universe {
        let mut u = Universe::new();
        u.declare_type("vehicle", None).unwrap();
        u.declare_type("truck", Some("vehicle")).unwrap();
        u.declare_object("car1", "vehicle").unwrap();
        u.declare_object("truck1", "truck").unwrap();
        u.declare_object("truck2", "truck").unwrap();
        u
    }

    #[test]
    fn roots_are_preseeded() {
        let u = Universe::new();
        assert!(u.type_id("object").is_ok());
        assert!(u.type_id("enum").is_ok());
    }

    #[test]
    fn object_values_index_within_type() {
        let u = universe();
        let t1 = u.object_id("truck1").unwrap();
        let t2 = u.object_id("truck2").unwrap();
        assert_eq!(u.object(t1).value, 0.0);
        assert_eq!(u.object(t2).value, 1.0);
    }

    #[test]
    fn subtyping_includes_descendants() {
        let u = universe();
        let vehicle = u.type_id("vehicle").unwrap();
        let truck = u.type_id("truck").unwrap();
        assert!(u.is_subtype(truck, vehicle));
        assert!(!u.is_subtype(vehicle, truck));
        assert_eq!(u.objects_of_type(vehicle).len(), 3);
        assert_eq!(u.objects_of_type(truck).len(), 2);
    }

    #[test]
    fn unknown_names_are_loud() {
        let u = universe();
        assert!(matches!(
            u.object_id("boat1"),
            Err(TaskError::UndefinedReference { kind: "object", .. })
        ));
    }
}
