//! Naming engine and declaration scheduling for typeforge.
//!
//! Renderers feed nameable types into a [`namespace::NameStore`], run the
//! assignment fixpoint, and get a frozen name map back; declaration
//! scheduling orders definitions and inserts forward declarations where
//! target languages need them.

pub mod declaration;
pub mod gather;
pub mod namer;
pub mod namespace;
pub mod plan;
pub mod styles;

pub use declaration::{break_type_cycles, declaration_ir, Declaration, DeclarationIR, DeclarationKind};
pub use gather::gathered_names;
pub use namer::Namer;
pub use namespace::{NameId, NameStore, NamespaceId, NamerId};
pub use plan::{assign_type_names, AssignedNames};
pub use styles::{camel_case, pascal_case, snake_case, upper_snake_case};
