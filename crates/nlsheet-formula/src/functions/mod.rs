//! Built-in functions

pub mod logical;
pub mod lookup;
pub mod math;

use crate::error::FormulaResult;
use crate::evaluator::FormulaValue;
use std::collections::HashMap;

/// Function implementation signature
///
/// Arguments arrive already evaluated; ranges arrive as
/// [`FormulaValue::Array`].
pub type FunctionImpl = fn(&[FormulaValue]) -> FormulaResult<FormulaValue>;

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
}

/// Function registry
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_lookup_functions();

        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    fn register_math_functions(&mut self) {
        for (name, implementation) in [
            ("SUM", math::fn_sum as FunctionImpl),
            ("AVERAGE", math::fn_average),
            ("MIN", math::fn_min),
            ("MAX", math::fn_max),
            ("COUNT", math::fn_count),
        ] {
            self.register(FunctionDef {
                name,
                min_args: 1,
                max_args: None,
                implementation,
            });
        }

        // ABS
        self.register(FunctionDef {
            name: "ABS",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_abs,
        });

        // ROUND
        self.register(FunctionDef {
            name: "ROUND",
            min_args: 1,
            max_args: Some(2),
            implementation: math::fn_round,
        });
    }

    fn register_logical_functions(&mut self) {
        // IF
        self.register(FunctionDef {
            name: "IF",
            min_args: 2,
            max_args: Some(3),
            implementation: logical::fn_if,
        });

        // AND
        self.register(FunctionDef {
            name: "AND",
            min_args: 1,
            max_args: None,
            implementation: logical::fn_and,
        });

        // OR
        self.register(FunctionDef {
            name: "OR",
            min_args: 1,
            max_args: None,
            implementation: logical::fn_or,
        });

        // NOT
        self.register(FunctionDef {
            name: "NOT",
            min_args: 1,
            max_args: Some(1),
            implementation: logical::fn_not,
        });

        // IFERROR
        self.register(FunctionDef {
            name: "IFERROR",
            min_args: 2,
            max_args: Some(2),
            implementation: logical::fn_iferror,
        });
    }

    fn register_lookup_functions(&mut self) {
        // VLOOKUP
        self.register(FunctionDef {
            name: "VLOOKUP",
            min_args: 3,
            max_args: Some(4),
            implementation: lookup::fn_vlookup,
        });
    }
}

/// Visit every scalar in the arguments, flattening arrays row by row
pub(crate) fn flatten(args: &[FormulaValue]) -> impl Iterator<Item = &FormulaValue> {
    args.iter().flat_map(scalars)
}

fn scalars(arg: &FormulaValue) -> Box<dyn Iterator<Item = &FormulaValue> + '_> {
    match arg {
        FormulaValue::Array(rows) => Box::new(rows.iter().flatten()),
        scalar => Box::new(std::iter::once(scalar)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::new();
        assert!(registry.get("sum").is_some());
        assert!(registry.get("IfError").is_some());
        assert!(registry.get("SUMIF").is_none());
    }

    #[test]
    fn test_registered_names() {
        let registry = FunctionRegistry::new();
        for name in [
            "ABS", "AND", "AVERAGE", "COUNT", "IF", "IFERROR", "MAX", "MIN", "NOT", "OR", "ROUND",
            "SUM", "VLOOKUP",
        ] {
            assert_eq!(registry.get(name).map(|def| def.name), Some(name));
        }
    }

    #[test]
    fn test_flatten_arrays() {
        let args = vec![
            FormulaValue::Number(1.0),
            FormulaValue::Array(vec![
                vec![FormulaValue::Number(2.0), FormulaValue::Number(3.0)],
                vec![FormulaValue::Empty, FormulaValue::Number(4.0)],
            ]),
        ];
        assert_eq!(flatten(&args).count(), 5);
    }
}
