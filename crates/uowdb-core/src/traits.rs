use crate::model::EntityModel;

///
/// Path
/// Fully-qualified schema path.
///

pub trait Path {
    const PATH: &'static str;
}

///
/// EntityKind
///
/// Seam binding a Rust marker type to its static entity model. Models are
/// written by hand where the schema is declared; the runtime never
/// inspects the marker type itself.
///

pub trait EntityKind: Path + 'static {
    const MODEL: &'static EntityModel;
}
