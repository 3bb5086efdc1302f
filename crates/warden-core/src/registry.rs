//! Entity-class registry.
//!
//! The engine never dispatches entity CRUD itself; it only needs the static
//! metadata that class owners register at startup: which actions a class
//! defines (with their flag bitmasks), and which named functions are
//! auto-granted alongside a create/read right. [`StaticRegistry`] is the
//! in-process implementation; anything resolving the same contract can stand
//! in for it.

use std::collections::HashMap;

use uuid::Uuid;

use crate::actions::Action;

/// A registered entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityClass {
    /// Class identifier.
    pub id: Uuid,
    /// Owning module name.
    pub module: String,
    /// Class name, unique within the module.
    pub name: String,
}

/// An action defined for an entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAction {
    /// Numeric action code.
    pub code: i32,
    /// Display name.
    pub name: String,
    /// Flag bitmask consulted when the action is authorized through another
    /// grant (save/submit ride on the write grant).
    pub flag: i64,
    /// Whether a right for this exact code can be granted. Flag-authorized
    /// sub-actions carry `false`.
    pub authorize: bool,
}

impl ClassAction {
    /// A directly authorizable action with no flag bits.
    #[must_use]
    pub fn new(action: Action, name: impl Into<String>) -> Self {
        Self {
            code: action.code(),
            name: name.into(),
            flag: 0,
            authorize: true,
        }
    }

    /// A flag-authorized sub-action (not directly grantable).
    #[must_use]
    pub fn flagged(action: Action, name: impl Into<String>, flag: i64) -> Self {
        Self {
            code: action.code(),
            name: name.into(),
            flag,
            authorize: false,
        }
    }
}

/// A named UI function that can be granted to roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    /// Function identifier.
    pub id: Uuid,
    /// Owning module name.
    pub module: String,
    /// Function name, unique within the module.
    pub name: String,
}

/// Read-side contract for entity-class and function metadata.
pub trait EntityClassRegistry: Send + Sync {
    /// Resolve a class by id.
    fn class_by_id(&self, id: Uuid) -> Option<EntityClass>;

    /// Resolve a class by (module, name).
    fn class_by_name(&self, module: &str, name: &str) -> Option<EntityClass>;

    /// The action definition for a class, by numeric code.
    fn action(&self, class_id: Uuid, code: i32) -> Option<ClassAction>;

    /// Functions auto-granted when a right for `action` is added on the class.
    fn auto_right_functions(&self, class_id: Uuid, action: Action) -> Vec<FunctionDef>;

    /// Resolve a function by id.
    fn function_by_id(&self, id: Uuid) -> Option<FunctionDef>;

    /// Resolve a function by (module, name).
    fn function_by_name(&self, module: &str, name: &str) -> Option<FunctionDef>;
}

/// In-process registry populated once at startup.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    classes: HashMap<Uuid, EntityClass>,
    classes_by_name: HashMap<(String, String), Uuid>,
    actions: HashMap<(Uuid, i32), ClassAction>,
    auto_rights: HashMap<(Uuid, i32), Vec<Uuid>>,
    functions: HashMap<Uuid, FunctionDef>,
    functions_by_name: HashMap<(String, String), Uuid>,
}

impl StaticRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> StaticRegistryBuilder {
        StaticRegistryBuilder {
            registry: Self::default(),
        }
    }
}

impl EntityClassRegistry for StaticRegistry {
    fn class_by_id(&self, id: Uuid) -> Option<EntityClass> {
        self.classes.get(&id).cloned()
    }

    fn class_by_name(&self, module: &str, name: &str) -> Option<EntityClass> {
        let id = self
            .classes_by_name
            .get(&(module.to_string(), name.to_string()))?;
        self.classes.get(id).cloned()
    }

    fn action(&self, class_id: Uuid, code: i32) -> Option<ClassAction> {
        self.actions.get(&(class_id, code)).cloned()
    }

    fn auto_right_functions(&self, class_id: Uuid, action: Action) -> Vec<FunctionDef> {
        self.auto_rights
            .get(&(class_id, action.code()))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.functions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn function_by_id(&self, id: Uuid) -> Option<FunctionDef> {
        self.functions.get(&id).cloned()
    }

    fn function_by_name(&self, module: &str, name: &str) -> Option<FunctionDef> {
        let id = self
            .functions_by_name
            .get(&(module.to_string(), name.to_string()))?;
        self.functions.get(id).cloned()
    }
}

/// Builder for [`StaticRegistry`].
#[derive(Debug)]
pub struct StaticRegistryBuilder {
    registry: StaticRegistry,
}

impl StaticRegistryBuilder {
    /// Register an entity class and return its id.
    pub fn add_class(&mut self, module: impl Into<String>, name: impl Into<String>) -> Uuid {
        let class = EntityClass {
            id: Uuid::new_v4(),
            module: module.into(),
            name: name.into(),
        };
        let id = class.id;
        self.registry
            .classes_by_name
            .insert((class.module.clone(), class.name.clone()), id);
        self.registry.classes.insert(id, class);
        id
    }

    /// Define an action on a class.
    pub fn add_action(&mut self, class_id: Uuid, action: ClassAction) -> &mut Self {
        self.registry.actions.insert((class_id, action.code), action);
        self
    }

    /// Define the standard action set on a class: create/read/write/delete,
    /// plus flag-authorized save and submit.
    pub fn add_standard_actions(&mut self, class_id: Uuid) -> &mut Self {
        self.add_action(class_id, ClassAction::new(Action::Create, "Create"))
            .add_action(class_id, ClassAction::new(Action::Read, "View"))
            .add_action(class_id, ClassAction::new(Action::Write, "Edit"))
            .add_action(class_id, ClassAction::new(Action::Delete, "Delete"))
            .add_action(class_id, ClassAction::flagged(Action::Save, "Save", 0b01))
            .add_action(class_id, ClassAction::flagged(Action::Submit, "Submit", 0b10))
    }

    /// Register a named function and return its id.
    pub fn add_function(&mut self, module: impl Into<String>, name: impl Into<String>) -> Uuid {
        let function = FunctionDef {
            id: Uuid::new_v4(),
            module: module.into(),
            name: name.into(),
        };
        let id = function.id;
        self.registry
            .functions_by_name
            .insert((function.module.clone(), function.name.clone()), id);
        self.registry.functions.insert(id, function);
        id
    }

    /// Associate a function with a class action so that granting a right for
    /// that action also grants the function.
    pub fn add_auto_right(&mut self, class_id: Uuid, action: Action, function_id: Uuid) -> &mut Self {
        self.registry
            .auto_rights
            .entry((class_id, action.code()))
            .or_default()
            .push(function_id);
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> StaticRegistry {
        self.registry
    }
}
