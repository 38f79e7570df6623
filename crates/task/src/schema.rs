use crate::Object;
use hzn_core::Value;
use serde::Deserialize;
use serde::Serialize;

/// The four kinds of parametrized variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    StateFluent,
    ActionFluent,
    IntermFluent,
    NonFluent,
}

/// The value space of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Real,
    /// Enum-like: values range over the objects of the named type.
    Object(String),
}

/// A schematic variable: a name templated over an ordered list of parameter
/// types. Grounding instantiates one fluent per tuple of the parameter
/// types' object Cartesian product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSchema {
    pub name: String,
    /// Parameter type names, in signature order.
    pub params: Vec<String>,
    pub kind: VariableKind,
    pub value_type: ValueType,
    pub default_value: Value,
    /// Stratification level of intermediate fluents; irrelevant otherwise.
    pub level: usize,
}

impl VariableSchema {
    /// The ground name `name(obj1, obj2, …)` for a parameter assignment;
    /// parameterless schemas ground to the bare name.
    pub fn ground_name(&self, objects: &[&Object]) -> String {
        ground_name(&self.name, objects.iter().map(|o| o.name.as_str()))
    }
}

/// Formats `name(arg1, arg2, …)`, or the bare name without arguments.
pub fn ground_name<'a>(name: &str, args: impl IntoIterator<Item = &'a str>) -> String {
    let mut args = args.into_iter().peekable();
    if args.peek().is_none() {
        return name.to_string();
    }
    let mut result = String::from(name);
    result.push('(');
    for (i, arg) in args.enumerate() {
        if i > 0 {
            result.push_str(", ");
        }
        result.push_str(arg);
    }
    result.push(')');
    result
}

/// A schematic CPF definition: the head schema name, the names its formula
/// binds the head parameters to, and the body expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpfSchema {
    pub name: String,
    /// Head parameter names, positionally matching the schema's parameter
    /// types (e.g. `["?t", "?c"]`).
    pub params: Vec<String>,
    pub formula: std::rc::Rc<crate::Expr>,
}

/// A ground boolean action fluent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFluent {
    pub name: String,
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_names() {
        assert_eq!(ground_name("running", []), "running");
        assert_eq!(ground_name("at", ["truck1", "depot"]), "at(truck1, depot)");
    }
}
