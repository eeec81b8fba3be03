//! Parsed layer content before it is turned into a stage.

/// A raw value as written in the file, before typing.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Number(f64),
    Str(String),
    Ident(String),
    Path(String),
    Asset(String),
    Tuple(Vec<RawValue>),
    List(Vec<RawValue>),
    /// Key/value pairs, e.g. `{ 0: (1, 2, 3), 10: (4, 5, 6) }`
    Dict(Vec<(RawValue, RawValue)>),
}

/// How a prim is introduced in the layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Specifier {
    Def,
    Over,
    Class,
}

/// A parsed property (attribute or relationship).
#[derive(Clone, Debug, PartialEq)]
pub struct PropertySpec {
    /// Property name, e.g. `xformOp:translate`
    pub name: String,

    /// Declared type, e.g. `point3f[]`; `rel` for relationships
    pub type_name: String,

    /// Default value
    pub default: Option<RawValue>,

    /// `(time, value)` pairs from a `.timeSamples` block
    pub time_samples: Vec<(f64, RawValue)>,

    /// Source line, for error reporting
    pub line: usize,
}

/// A parsed prim with its children.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimSpec {
    pub specifier: Specifier,

    /// Schema type name (empty for untyped prims)
    pub type_name: String,

    /// Prim name (last path element)
    pub name: String,

    pub kind: Option<String>,

    pub active: Option<bool>,

    pub properties: Vec<PropertySpec>,

    pub children: Vec<PrimSpec>,

    /// Source line, for error reporting
    pub line: usize,
}

/// Layer-level metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerMetadata {
    pub up_axis: Option<String>,
    pub meters_per_unit: Option<f64>,
    pub default_prim: Option<String>,
}

/// A whole parsed layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerSpec {
    pub metadata: LayerMetadata,
    pub prims: Vec<PrimSpec>,
}
