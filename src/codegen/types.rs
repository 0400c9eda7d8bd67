//! Mapping of semantic types to LLVM types and byte layouts.
//!
//! Integer widths map to `i8…i128`; `Bool` is `i1` at the instruction
//! level (comparison results, branch conditions) but is stored and
//! passed as `i32`, so booleans survive generic channels unchanged.
//! Heap handles (`Str`, `List`, `File`), references, slices and erased
//! pointers are all `ptr`. Enums are `{ i32, [N x i8] }` with `N` the
//! largest variant payload; structs lower to `%struct.Name` with fields
//! in canonical (alphabetical) order; tuples are anonymous structs;
//! `dyn` values and closures are two-pointer fat values.

use crate::typechecker::behavior::{Definitions, TypeDefKind};
use crate::typechecker::types::{IntKind, Type};

pub struct Layout<'a> {
    pub defs: &'a Definitions,
}

impl<'a> Layout<'a> {
    pub fn new(defs: &'a Definitions) -> Self {
        Layout { defs }
    }

    /// Struct fields in canonical order with the nominal arguments
    /// substituted in.
    pub fn struct_fields(&self, name: &str, args: &[Type]) -> Vec<(String, Type)> {
        let Some(def) = self.defs.get_type(name) else {
            return vec![];
        };
        let TypeDefKind::Struct(struct_def) = &def.kind else {
            return vec![];
        };
        let mut mapping = std::collections::HashMap::new();
        for (generic, arg) in def.generics.iter().zip(args) {
            mapping.insert(generic.clone(), arg.clone());
        }
        let mut fields: Vec<(String, Type)> = struct_def
            .fields
            .iter()
            .map(|(field, ty, _)| (field.clone(), ty.substitute(&mapping)))
            .collect();
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        fields
    }

    pub fn field_index(&self, name: &str, args: &[Type], field: &str) -> Option<(usize, Type)> {
        self.struct_fields(name, args)
            .into_iter()
            .enumerate()
            .find(|(_, (candidate, _))| candidate == field)
            .map(|(index, (_, ty))| (index, ty))
    }

    /// Variant payloads with nominal arguments substituted, in tag order.
    pub fn enum_variants(&self, name: &str, args: &[Type]) -> Vec<(String, Vec<Type>)> {
        let Some(def) = self.defs.get_type(name) else {
            return vec![];
        };
        let TypeDefKind::Enum(enum_def) = &def.kind else {
            return vec![];
        };
        let mut mapping = std::collections::HashMap::new();
        for (generic, arg) in def.generics.iter().zip(args) {
            mapping.insert(generic.clone(), arg.clone());
        }
        enum_def
            .variants
            .iter()
            .map(|(variant, payload)| {
                (
                    variant.clone(),
                    payload.iter().map(|t| t.substitute(&mapping)).collect(),
                )
            })
            .collect()
    }

    pub fn is_enum(&self, name: &str) -> bool {
        matches!(
            self.defs.get_type(name).map(|def| def.kind),
            Some(TypeDefKind::Enum(_))
        )
    }

    /// Byte size used for enum payload blobs and lifetime markers.
    pub fn size_of(&self, ty: &Type) -> u64 {
        match ty {
            Type::Int(kind) => (kind.bits() / 8) as u64,
            Type::Float(kind) => (kind.bits() / 8) as u64,
            Type::Boolean => 4,
            Type::Character => 4,
            Type::Unit | Type::Never => 0,
            Type::String | Type::Slice(_) | Type::Reference { .. } => 8,
            Type::Function { .. } | Type::DynBehavior(_) => 16,
            Type::Tuple(elements) => elements.iter().map(|e| self.size_of(e)).sum(),
            Type::Array(element, count) => self.size_of(element) * count,
            Type::Named { name, args } => {
                if name == "Range" {
                    return args.first().map(|t| self.size_of(t) * 2).unwrap_or(16);
                }
                // Opaque runtime handles, regardless of their registry
                // entry.
                if name == "List" || name == "File" {
                    return 8;
                }
                match self.defs.get_type(name).map(|def| def.kind) {
                    Some(TypeDefKind::Enum(_)) => 4 + self.max_payload_size(name, args),
                    Some(TypeDefKind::Struct(_)) => self
                        .struct_fields(name, args)
                        .iter()
                        .map(|(_, ty)| self.size_of(ty))
                        .sum(),
                    Some(TypeDefKind::Alias(target)) => self.size_of(&target),
                    // Opaque runtime handles (List, File).
                    None => 8,
                }
            }
            Type::Generic(_) | Type::Var(_) | Type::Error => 8,
        }
    }

    pub fn max_payload_size(&self, name: &str, args: &[Type]) -> u64 {
        self.enum_variants(name, args)
            .iter()
            .map(|(_, payload)| payload.iter().map(|t| self.size_of(t)).sum::<u64>())
            .max()
            .unwrap_or(0)
    }

    /// The LLVM value type of a semantic type.
    pub fn llvm_type(&self, ty: &Type) -> String {
        match ty {
            Type::Int(IntKind::I8) | Type::Int(IntKind::U8) => "i8".to_string(),
            Type::Int(IntKind::I16) | Type::Int(IntKind::U16) => "i16".to_string(),
            Type::Int(IntKind::I32) | Type::Int(IntKind::U32) => "i32".to_string(),
            Type::Int(IntKind::I64) | Type::Int(IntKind::U64) => "i64".to_string(),
            Type::Int(IntKind::I128) | Type::Int(IntKind::U128) => "i128".to_string(),
            Type::Float(crate::typechecker::types::FloatKind::F32) => "float".to_string(),
            Type::Float(crate::typechecker::types::FloatKind::F64) => "double".to_string(),
            Type::Boolean => "i32".to_string(),
            Type::Character => "i32".to_string(),
            Type::Unit | Type::Never => "void".to_string(),
            Type::String | Type::Slice(_) | Type::Reference { .. } => "ptr".to_string(),
            Type::Function { .. } | Type::DynBehavior(_) => "{ ptr, ptr }".to_string(),
            Type::Tuple(elements) => {
                let fields: Vec<String> = elements.iter().map(|e| self.llvm_type(e)).collect();
                format!("{{ {} }}", fields.join(", "))
            }
            Type::Array(element, count) => {
                format!("[{count} x {}]", self.llvm_type(element))
            }
            Type::Named { name, args } => {
                if name == "Range" {
                    let element = args
                        .first()
                        .map(|t| self.llvm_type(t))
                        .unwrap_or_else(|| "i64".to_string());
                    return format!("{{ {element}, {element} }}");
                }
                if name == "List" || name == "File" {
                    return "ptr".to_string();
                }
                match self.defs.get_type(name).map(|def| def.kind) {
                    Some(TypeDefKind::Enum(_)) => {
                        format!("{{ i32, [{} x i8] }}", self.max_payload_size(name, args))
                    }
                    Some(TypeDefKind::Struct(_)) => {
                        if args.is_empty() {
                            format!("%struct.{name}")
                        } else {
                            // Generic instantiations are structural.
                            let fields: Vec<String> = self
                                .struct_fields(name, args)
                                .iter()
                                .map(|(_, ty)| self.llvm_type(ty))
                                .collect();
                            format!("{{ {} }}", fields.join(", "))
                        }
                    }
                    Some(TypeDefKind::Alias(target)) => self.llvm_type(&target),
                    None => "ptr".to_string(),
                }
            }
            Type::Generic(_) | Type::Var(_) | Type::Error => "ptr".to_string(),
        }
    }

    /// `%struct.Name = type { … }` lines for every non-generic struct,
    /// alphabetically.
    pub fn named_struct_defs(&self) -> String {
        let mut names: Vec<String> = self
            .defs
            .all_struct_names()
            .into_iter()
            .filter(|name| {
                self.defs
                    .get_type(name)
                    .map(|def| def.generics.is_empty())
                    .unwrap_or(false)
            })
            .filter(|name| name != "Range" && name != "List" && name != "File")
            .collect();
        names.sort_unstable();

        let mut out = String::new();
        for name in names {
            let fields: Vec<String> = self
                .struct_fields(&name, &[])
                .iter()
                .map(|(_, ty)| self.llvm_type(ty))
                .collect();
            if fields.is_empty() {
                out.push_str(&format!("%struct.{name} = type {{}}\n"));
            } else {
                out.push_str(&format!("%struct.{name} = type {{ {} }}\n", fields.join(", ")));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::behavior::{EnumDef, StructDef, TypeDef};
    use crate::parser::ast::Visibility;

    fn defs_with_maybe() -> Definitions {
        let defs = Definitions::new();
        defs.add_type(TypeDef {
            name: "Maybe".into(),
            generics: vec!["T".into()],
            kind: TypeDefKind::Enum(EnumDef {
                variants: vec![
                    ("Just".into(), vec![Type::Generic("T".into())]),
                    ("Nothing".into(), vec![]),
                ],
            }),
        });
        defs.add_type(TypeDef {
            name: "Point".into(),
            generics: vec![],
            kind: TypeDefKind::Struct(StructDef {
                fields: vec![
                    ("y".into(), Type::Int(IntKind::I32), Visibility::Private),
                    ("x".into(), Type::Int(IntKind::I32), Visibility::Private),
                ],
            }),
        });
        defs
    }

    #[test]
    fn test_enum_layout_uses_max_payload() {
        let defs = defs_with_maybe();
        let layout = Layout::new(&defs);
        let maybe_i64 = Type::Named {
            name: "Maybe".into(),
            args: vec![Type::Int(IntKind::I64)],
        };
        assert_eq!(layout.llvm_type(&maybe_i64), "{ i32, [8 x i8] }");
        assert_eq!(layout.size_of(&maybe_i64), 12);
    }

    #[test]
    fn test_struct_fields_canonical_order() {
        let defs = defs_with_maybe();
        let layout = Layout::new(&defs);
        let fields = layout.struct_fields("Point", &[]);
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(layout.field_index("Point", &[], "y").unwrap().0, 1);
    }

    #[test]
    fn test_bool_is_widened_in_memory() {
        let defs = Definitions::new();
        let layout = Layout::new(&defs);
        assert_eq!(layout.llvm_type(&Type::Boolean), "i32");
    }

    #[test]
    fn test_fat_pointer_types() {
        let defs = Definitions::new();
        let layout = Layout::new(&defs);
        assert_eq!(layout.llvm_type(&Type::DynBehavior("Reader".into())), "{ ptr, ptr }");
        assert_eq!(layout.size_of(&Type::DynBehavior("Reader".into())), 16);
    }
}
