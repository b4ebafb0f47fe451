//! Static inspection of contract binaries.
//!
//! Reads the import and export sections without compiling or running the
//! module, to tell which ABI a contract was built for and whether the
//! mocknet can link it.

use serde::Serialize;
use wasmparser::{
    BinaryReaderError, ExportSectionReader, FunctionSectionReader, ImportSectionReader, Parser,
    Payload, TypeSectionReader,
};

use crate::address;
use crate::error::MocknetError;
use crate::runtime::{AbiAdapter, EntryPoint, ENV_MODULE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternKind {
    Function,
    Table,
    Memory,
    Global,
}

/// A function signature, as parameter and result counts. Every value
/// crossing the contract boundary is an `i32` region pointer, so counts are
/// what matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Arity {
    pub params: usize,
    pub results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEntry {
    pub module: String,
    pub name: String,
    pub kind: ExternKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arity: Option<Arity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportEntry {
    pub name: String,
    pub kind: ExternKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arity: Option<Arity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractManifest {
    pub code_hash: String,
    pub size: usize,
    pub imports: Vec<ImportEntry>,
    pub exports: Vec<ExportEntry>,
}

impl ContractManifest {
    pub fn parse(wasm: &[u8]) -> Result<Self, MocknetError> {
        let mut builder = ManifestBuilder::default();
        for payload in Parser::new(0).parse_all(wasm) {
            builder.process_payload(payload.map_err(parse_error)?)?;
        }
        Ok(builder.finish(wasm))
    }

    pub fn export(&self, name: &str) -> Option<&ExportEntry> {
        self.exports.iter().find(|export| export.name == name)
    }

    fn exports_function(&self, name: &str) -> bool {
        self.export(name)
            .is_some_and(|export| export.kind == ExternKind::Function)
    }

    /// The ABI generation the entry points belong to, if they match one.
    pub fn detect_abi(&self) -> Option<AbiAdapter> {
        [AbiAdapter::V1, AbiAdapter::V0].into_iter().find(|abi| {
            self.exports_function(abi.export_name(EntryPoint::Instantiate))
                && self.exports_function(abi.export_name(EntryPoint::Execute))
        })
    }

    /// Reasons the mocknet could not run this contract under `abi`.
    pub fn problems(&self, abi: AbiAdapter) -> Vec<String> {
        let mut problems = Vec::new();

        match self.export("memory") {
            Some(export) if export.kind == ExternKind::Memory => {}
            _ => problems.push("no `memory` export".to_string()),
        }
        match self.export("allocate").and_then(|export| export.arity) {
            Some(Arity { params: 1, results: 1 }) => {}
            Some(arity) => problems.push(format!(
                "`allocate` takes {} parameters and returns {} values, expected 1 and 1",
                arity.params, arity.results
            )),
            None => problems.push("no `allocate` export".to_string()),
        }

        for (entry, params) in entry_point_params(abi) {
            let name = abi.export_name(entry);
            match self.export(name).and_then(|export| export.arity) {
                Some(arity) if arity.params == params && arity.results == 1 => {}
                Some(arity) => problems.push(format!(
                    "`{name}` takes {} parameters, the {abi} ABI passes {params}",
                    arity.params
                )),
                None => problems.push(format!("no `{name}` export")),
            }
        }

        let provided = abi.import_names();
        for import in &self.imports {
            if import.module != ENV_MODULE || !provided.contains(&import.name.as_str()) {
                problems.push(format!(
                    "import `{}::{}` is not provided under the {abi} ABI",
                    import.module, import.name
                ));
            }
        }
        problems
    }
}

fn entry_point_params(abi: AbiAdapter) -> [(EntryPoint, usize); 3] {
    match abi {
        AbiAdapter::V0 => [
            (EntryPoint::Instantiate, 2),
            (EntryPoint::Execute, 2),
            (EntryPoint::Query, 1),
        ],
        AbiAdapter::V1 => [
            (EntryPoint::Instantiate, 3),
            (EntryPoint::Execute, 3),
            (EntryPoint::Query, 2),
        ],
    }
}

fn parse_error(e: BinaryReaderError) -> MocknetError {
    MocknetError::InvalidModule(format!("{} (at offset {:#x})", e.message(), e.offset()))
}

#[derive(Default)]
struct ManifestBuilder {
    types: Vec<Arity>,
    // Type index of every function, imported ones first.
    functions: Vec<u32>,
    imports: Vec<(String, String, ExternKind, Option<u32>)>,
    exports: Vec<(String, ExternKind, u32)>,
}

impl ManifestBuilder {
    fn process_payload(&mut self, payload: Payload<'_>) -> Result<(), MocknetError> {
        match payload {
            Payload::TypeSection(reader) => self.parse_types(reader)?,
            Payload::ImportSection(reader) => self.parse_imports(reader)?,
            Payload::FunctionSection(reader) => self.parse_functions(reader)?,
            Payload::ExportSection(reader) => self.parse_exports(reader)?,
            _ => {}
        }
        Ok(())
    }

    fn parse_types(&mut self, reader: TypeSectionReader<'_>) -> Result<(), MocknetError> {
        for rec_group in reader {
            let rec_group = rec_group.map_err(parse_error)?;
            for ty in rec_group.into_types() {
                // Non-function types still take up an index.
                let arity = match &ty.composite_type.inner {
                    wasmparser::CompositeInnerType::Func(func_type) => Arity {
                        params: func_type.params().len(),
                        results: func_type.results().len(),
                    },
                    _ => Arity {
                        params: 0,
                        results: 0,
                    },
                };
                self.types.push(arity);
            }
        }
        Ok(())
    }

    fn parse_imports(&mut self, reader: ImportSectionReader<'_>) -> Result<(), MocknetError> {
        for import in reader {
            let import = import.map_err(parse_error)?;
            let (kind, type_index) = match import.ty {
                wasmparser::TypeRef::Func(idx) => {
                    self.functions.push(idx);
                    (ExternKind::Function, Some(idx))
                }
                wasmparser::TypeRef::Table(_) => (ExternKind::Table, None),
                wasmparser::TypeRef::Memory(_) => (ExternKind::Memory, None),
                wasmparser::TypeRef::Global(_) => (ExternKind::Global, None),
                wasmparser::TypeRef::Tag(_) => continue,
            };
            self.imports.push((
                import.module.to_string(),
                import.name.to_string(),
                kind,
                type_index,
            ));
        }
        Ok(())
    }

    fn parse_functions(&mut self, reader: FunctionSectionReader<'_>) -> Result<(), MocknetError> {
        for type_index in reader {
            self.functions.push(type_index.map_err(parse_error)?);
        }
        Ok(())
    }

    fn parse_exports(&mut self, reader: ExportSectionReader<'_>) -> Result<(), MocknetError> {
        for export in reader {
            let export = export.map_err(parse_error)?;
            let kind = match export.kind {
                wasmparser::ExternalKind::Func => ExternKind::Function,
                wasmparser::ExternalKind::Table => ExternKind::Table,
                wasmparser::ExternalKind::Memory => ExternKind::Memory,
                wasmparser::ExternalKind::Global => ExternKind::Global,
                wasmparser::ExternalKind::Tag => continue,
            };
            self.exports.push((export.name.to_string(), kind, export.index));
        }
        Ok(())
    }

    fn arity_of_type(&self, type_index: u32) -> Option<Arity> {
        self.types.get(type_index as usize).copied()
    }

    fn finish(self, wasm: &[u8]) -> ContractManifest {
        let imports = self
            .imports
            .iter()
            .map(|(module, name, kind, type_index)| ImportEntry {
                module: module.clone(),
                name: name.clone(),
                kind: *kind,
                arity: type_index.and_then(|idx| self.arity_of_type(idx)),
            })
            .collect();
        let exports = self
            .exports
            .iter()
            .map(|(name, kind, index)| ExportEntry {
                name: name.clone(),
                kind: *kind,
                arity: match kind {
                    ExternKind::Function => self
                        .functions
                        .get(*index as usize)
                        .and_then(|type_index| self.arity_of_type(*type_index)),
                    _ => None,
                },
            })
            .collect();

        ContractManifest {
            code_hash: address::code_hash(wasm),
            size: wasm.len(),
            imports,
            exports,
        }
    }
}
