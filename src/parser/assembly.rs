use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::ast::{Function, Module, Span};
use crate::bytecode::{Bytecode, BytecodeFunction};
use crate::cache::{BytecodeEmitter, ImportData, MemoizedCache, SymbolicBindings, TypeInfo};
use crate::vm::{VmError, VmResult};

/// An assembled module plus the instruction list of each of its functions.
#[derive(Debug, Clone)]
pub struct Assembly {
    module: Rc<Module>,
    bodies: Rc<HashMap<String, Vec<Bytecode>>>,
}

impl Assembly {
    pub(super) fn new(module: Rc<Module>, bodies: HashMap<String, Vec<Bytecode>>) -> Self {
        Assembly { module, bodies: Rc::new(bodies) }
    }

    pub fn module(&self) -> &Rc<Module> {
        &self.module
    }

    pub fn body(&self, name: &str) -> Option<&[Bytecode]> {
        self.bodies.get(name).map(Vec::as_slice)
    }

    /// Functions and their bodies in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = (&Rc<Function>, &[Bytecode])> {
        self.module
            .functions
            .iter()
            .map(|f| (f, self.body(&f.name).unwrap_or_default()))
    }

    /// Registers the module with `import_data` and makes this assembly its
    /// bytecode source.
    pub fn install(&self, import_data: &mut ImportData) -> Rc<TypeInfo> {
        let type_info = import_data.put(self.module.clone());
        let emitter = AssemblyEmitter { module: self.module.name.clone(), bodies: self.bodies.clone() };
        import_data.set_bytecode_cache(Box::new(MemoizedCache::new(emitter)));
        type_info
    }

    /// Resolves `name` through the installed cache, so the entry function
    /// and every call to it share one compiled body.
    pub fn entry(&self, import_data: &ImportData, name: &str) -> VmResult<Rc<BytecodeFunction>> {
        let function = self
            .module
            .get_function(name)
            .ok_or_else(|| VmError::InvalidArgument(format!("no function named `{name}` in module `{}`", self.module.name)))?;
        let type_info = import_data.root_type_info(&self.module)?;
        let cache = import_data
            .bytecode_cache()
            .ok_or_else(|| VmError::InvalidArgument("bytecode cache is not set".to_string()))?;
        cache.get_or_create_bytecode_function(function, &type_info, None)
    }
}

/// Machine-readable disassembly.
#[derive(Debug, Serialize)]
pub struct Listing {
    pub module: String,
    pub enums: Vec<EnumListing>,
    pub functions: Vec<FunctionListing>,
}

#[derive(Debug, Serialize)]
pub struct EnumListing {
    pub name: String,
    pub underlying: String,
    pub members: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
pub struct FunctionListing {
    pub name: String,
    pub is_test: bool,
    pub params: Vec<(String, String)>,
    pub return_type: Option<String>,
    pub span: Span,
    pub bytecodes: Vec<InstructionListing>,
}

#[derive(Debug, Serialize)]
pub struct InstructionListing {
    pub pc: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operand: Option<String>,
    pub span: Span,
}

impl Assembly {
    pub fn listing(&self) -> Listing {
        let enums = self
            .module
            .enums
            .iter()
            .map(|def| EnumListing {
                name: def.name.clone(),
                underlying: def.underlying_type().to_string(),
                members: def
                    .members
                    .iter()
                    .map(|m| (m.name.clone(), m.value.to_bigint(def.signed).to_string()))
                    .collect(),
            })
            .collect();
        let functions = self
            .functions()
            .map(|(f, body)| FunctionListing {
                name: f.name.clone(),
                is_test: f.is_test,
                params: f.params.iter().map(|p| (p.name.clone(), p.ty.to_string())).collect(),
                return_type: f.return_type.as_ref().map(ToString::to_string),
                span: f.span,
                bytecodes: body
                    .iter()
                    .enumerate()
                    .map(|(pc, bc)| InstructionListing {
                        pc,
                        op: bc.op.name(),
                        operand: bc.data.as_ref().map(ToString::to_string),
                        span: bc.span,
                    })
                    .collect(),
            })
            .collect();
        Listing { module: self.module.name.clone(), enums, functions }
    }
}

/// Serves pre-assembled bodies; the text already is the compiled form, so
/// bindings select nothing extra.
pub struct AssemblyEmitter {
    module: String,
    bodies: Rc<HashMap<String, Vec<Bytecode>>>,
}

impl BytecodeEmitter for AssemblyEmitter {
    fn emit(
        &self,
        f: &Rc<Function>,
        type_info: &Rc<TypeInfo>,
        _caller_bindings: Option<&SymbolicBindings>,
    ) -> VmResult<BytecodeFunction> {
        if f.module != self.module {
            return Err(VmError::InvalidArgument(format!(
                "function `{}` does not belong to module `{}`",
                f.identifier(),
                self.module
            )));
        }
        let body = self
            .bodies
            .get(&f.name)
            .ok_or_else(|| VmError::InvalidArgument(format!("no bytecode for `{}`", f.identifier())))?;
        Ok(BytecodeFunction::new(f.clone(), Some(type_info.clone()), body.clone()))
    }
}

/// Disassembly in the format the assembler reads.
impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.module.name)?;
        for def in &self.module.enums {
            writeln!(f)?;
            writeln!(f, "enum {}: {} {{", def.name, def.underlying_type())?;
            for member in &def.members {
                writeln!(f, "    {} = {},", member.name, member.value.to_bigint(def.signed))?;
            }
            writeln!(f, "}}")?;
        }
        for (function, body) in self.functions() {
            writeln!(f)?;
            if function.is_test {
                writeln!(f, "test {} {{", function.name)?;
            } else {
                write!(f, "fn {}(", function.name)?;
                for (i, p) in function.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", p.name, p.ty)?;
                }
                write!(f, ")")?;
                if let Some(ret) = &function.return_type {
                    write!(f, " -> {ret}")?;
                }
                writeln!(f, " {{")?;
            }
            for bytecode in body {
                writeln!(f, "    {bytecode}")?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::assemble;
    use crate::value::Value;
    use crate::vm::interpret;

    const SOURCE: &str = "\
module top

enum Level: s2 {
    Low = -1,
    High = 1,
}

fn double(x: u8) -> u8 {
    load 0
    literal u8:2
    mul
}

test doubled {
    literal u8:21
    literal fn:top::double
    call
    literal u8:42
    literal builtin:assert_eq
    call
}
";

    #[test]
    fn disassembly_reassembles() {
        let asm = assemble(SOURCE).unwrap();
        let text = asm.to_string();
        assert!(text.contains("enum Level: s2 {\n    Low = -1,"));
        assert!(text.contains("fn double(x: u8) -> u8 {\n    load 0\n"));
        let again = assemble(&text).unwrap();
        assert_eq!(again.to_string(), text);
    }

    #[test]
    fn listing_serializes() {
        let asm = assemble(SOURCE).unwrap();
        let json = serde_json::to_value(asm.listing()).unwrap();
        assert_eq!(json["module"], "top");
        assert_eq!(json["enums"][0]["members"][0][1], "-1");
        let double = &json["functions"][0];
        assert_eq!(double["params"][0][1], "u8");
        assert_eq!(double["bytecodes"][1]["op"], "literal");
        assert_eq!(double["bytecodes"][1]["operand"], "u8:2");
        assert!(double["bytecodes"][2].get("operand").is_none());
        assert_eq!(json["functions"][1]["is_test"], true);
    }

    #[test]
    fn installed_entry_runs() {
        let asm = assemble(SOURCE).unwrap();
        let mut import_data = ImportData::new();
        asm.install(&mut import_data);
        let bf = asm.entry(&import_data, "double").unwrap();
        let v = interpret(&import_data, bf.clone(), vec![Value::ubits(8, 5)]).unwrap();
        assert_eq!(v, Value::ubits(8, 10));

        let again = asm.entry(&import_data, "double").unwrap();
        assert!(Rc::ptr_eq(&bf, &again));
        assert!(asm.entry(&import_data, "triple").is_err());
    }

    #[test]
    fn parametric_calls_get_a_child_type_info() {
        let asm = assemble(
            "module top\nfn id(x: u8) -> u8 { load 0 }\nfn f() -> u8 {\n literal u8:3\n literal fn:top::id\n call {N: 8}\n}\n",
        )
        .unwrap();
        let mut import_data = ImportData::new();
        let root = asm.install(&mut import_data);
        let bf = asm.entry(&import_data, "f").unwrap();
        assert_eq!(interpret(&import_data, bf, Vec::new()).unwrap(), Value::ubits(8, 3));

        let n8 = SymbolicBindings::new(vec![("N".to_string(), 8)]);
        let child = import_data.instantiation(&root, &n8);
        assert!(Rc::ptr_eq(child.parent().unwrap(), &root));

        let id = asm.module().get_function("id").unwrap();
        let cache = import_data.bytecode_cache().unwrap();
        let instantiated = cache.get_or_create_bytecode_function(id, &child, Some(&n8)).unwrap();
        let ti = instantiated.type_info().unwrap();
        assert!(Rc::ptr_eq(ti, &child));
        assert_eq!(ti.binding("N"), Some(8));
        let plain = asm.entry(&import_data, "id").unwrap();
        assert!(!Rc::ptr_eq(&plain, &instantiated));
        assert!(plain.type_info().unwrap().is_root());
    }

    #[test]
    fn emitter_rejects_foreign_functions() {
        let asm = assemble(SOURCE).unwrap();
        let mut import_data = ImportData::new();
        let ti = asm.install(&mut import_data);
        let foreign = Rc::new(Function {
            module: "other".to_string(),
            name: "double".to_string(),
            params: Vec::new(),
            return_type: None,
            is_test: false,
            span: crate::ast::Span::UNKNOWN,
        });
        let cache = import_data.bytecode_cache().unwrap();
        assert!(cache.get_or_create_bytecode_function(&foreign, &ti, None).is_err());
    }
}
