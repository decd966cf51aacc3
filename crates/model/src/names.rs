//! Fully-qualified name conventions.
//!
//! Code elements are named by their defining module, so every parser and
//! every reference from another module converges on the same key:
//!
//! ```text
//! MyApp                      solution (manifest file stem)
//! LibA                       assembly
//! LibA > Core.Parsers        namespace (one node per full dotted name)
//! LibA > Core.Parsers.Engine type
//! LibA > Core.Parsers.Engine.Run   member
//! ```

/// Separator between a module name and the dotted element path.
pub const CONTAINER_SEP: &str = " > ";

/// Name of the synthetic root every containment chain terminates at.
pub const ROOT_NAME: &str = "<root>";

/// Qualify a dotted element path with its defining assembly.
#[must_use]
pub fn assembly_qualified(assembly: &str, path: &str) -> String {
    if path.is_empty() {
        assembly.to_string()
    } else {
        format!("{assembly}{CONTAINER_SEP}{path}")
    }
}

/// Name of a member under its declaring type's fully-qualified name; also
/// how a nested type chains onto its declaring type.
#[must_use]
pub fn member_name(type_name: &str, member: &str) -> String {
    format!("{type_name}.{member}")
}

/// Last dotted segment of a fully-qualified name, for display.
#[must_use]
pub fn simple_name(name: &str) -> &str {
    let tail = name.rsplit(CONTAINER_SEP).next().unwrap_or(name);
    tail.rsplit('.').next().unwrap_or(tail)
}
