//! Inspection of the running kernel's type information.
//!
//! Structure layouts and helper availability differ between kernel
//! releases, so both are resolved at runtime against the kernel's own type
//! descriptions rather than assumed at build time. The trait below is the
//! seam the rest of the crate consumes; the provided implementation is
//! backed by BTF.

use std::{fs, path::Path};

use anyhow::{anyhow, bail, Result};
use btf_rs::{Btf, Type};

/// Type-information queries against the running kernel.
pub trait KernelInspect: Send + Sync {
    /// Byte offset of `field` inside the kernel structure `r#struct`.
    fn field_offset(&self, r#struct: &str, field: &str) -> Result<u32>;

    /// Whether the running kernel defines `value` in the enum `r#enum`.
    /// Used to probe for optional kernel capabilities.
    fn enum_value_exists(&self, r#enum: &str, value: &str) -> bool;
}

/// BTF-backed [`KernelInspect`], looking types up in vmlinux first and in
/// split module files second.
pub struct BtfInspector {
    vmlinux: Btf,
    modules: Vec<Btf>,
}

impl BtfInspector {
    /// Parse the running kernel's BTF files.
    pub fn from_kernel() -> Result<BtfInspector> {
        let vmlinux = Path::new("/sys/kernel/btf/vmlinux");
        let modules = fs::read_dir("/sys/kernel/btf")?
            .filter_map(|f| f.ok().map(|f| f.path()))
            .filter(|f| f.file_name().map(|n| n.ne("vmlinux")).unwrap_or(false))
            .collect::<Vec<_>>();

        Self::from_files(vmlinux, &modules)
    }

    /// Parse an explicit set of BTF files, `modules` being split files on
    /// top of `vmlinux`.
    pub fn from_files<P, M>(vmlinux: P, modules: &[M]) -> Result<BtfInspector>
    where
        P: AsRef<Path>,
        M: AsRef<Path>,
    {
        let vmlinux = Btf::from_file(&vmlinux)
            .map_err(|e| anyhow!("Could not parse {}: {e}", vmlinux.as_ref().display()))?;

        let modules = modules
            .iter()
            .map(|path| {
                Btf::from_split_file(path, &vmlinux)
                    .map_err(|e| anyhow!("Could not parse {}: {e}", path.as_ref().display()))
            })
            .collect::<Result<Vec<Btf>>>()?;

        Ok(BtfInspector { vmlinux, modules })
    }

    /// Resolve a type by name, yielding all matches together with the Btf
    /// object they came from. Subsequent lookups based on a match must use
    /// that same Btf object since type ids of different modules overlap.
    fn resolve_types(&self, name: &str) -> Vec<(&Btf, Type)> {
        let mut types = Vec::new();

        if let Ok(found) = self.vmlinux.resolve_types_by_name(name) {
            found.into_iter().for_each(|t| types.push((&self.vmlinux, t)));
        }

        for module in self.modules.iter() {
            if let Ok(found) = module.resolve_types_by_name(name) {
                found.into_iter().for_each(|t| types.push((module, t)));
            }
        }

        types
    }
}

impl KernelInspect for BtfInspector {
    fn field_offset(&self, r#struct: &str, field: &str) -> Result<u32> {
        for (btf, r#type) in self.resolve_types(r#struct) {
            if !matches!(r#type, Type::Struct(_) | Type::Union(_)) {
                continue;
            }

            if let Some(bits) = walk_members(btf, &r#type, field, 0) {
                if bits % 8 != 0 {
                    bail!("Field {field} of {} is a bitfield", r#struct);
                }
                return Ok(bits / 8);
            }
        }

        bail!("No struct {} with a field {field} in kernel type info", r#struct)
    }

    fn enum_value_exists(&self, r#enum: &str, value: &str) -> bool {
        for (btf, r#type) in self.resolve_types(r#enum) {
            let members = match &r#type {
                Type::Enum(e) => &e.members,
                _ => continue,
            };

            if members
                .iter()
                .any(|m| btf.resolve_name(m).map(|n| n == value).unwrap_or(false))
            {
                return true;
            }
        }

        false
    }
}

/// Look for a member in a struct or union type, recursing into anonymous
/// members. Returns the member's offset in bits.
fn walk_members(btf: &Btf, r#type: &Type, field: &str, offset: u32) -> Option<u32> {
    let r#type = match r#type {
        Type::Struct(r#struct) | Type::Union(r#struct) => r#struct,
        _ => return None,
    };

    for member in r#type.members.iter() {
        let name = btf.resolve_name(member).unwrap_or_default();
        if name == field {
            return Some(offset + member.bit_offset());
        } else if name.is_empty() {
            let Ok(inner) = btf.resolve_chained_type(member) else {
                continue;
            };

            if let Some(bits) = walk_members(btf, &inner, field, offset + member.bit_offset()) {
                return Some(bits);
            }
        }
    }

    None
}
