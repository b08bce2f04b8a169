//! The closed set of primitive block kinds shared by the scheduler, the
//! forward code generator, and the reverse lifter.
//!
//! The IR keeps the block type as the raw wire-format string; everything
//! above the IR dispatches on [`BlockKind`] so that an unrecognized type
//! can only ever take the pass-through path.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Inport,
    Outport,
    Constant,
    Gain,
    Sum,
    Product,
    Saturate,
    MinMax,
    Abs,
    RelationalOperator,
    Logic,
    Switch,
    Trigonometry,
    Math,
    UnitDelay,
    Memory,
    Integrator,
    DiscreteIntegrator,
    TransferFcn,
    SubSystem,
    Demux,
    Mux,
    Unknown(String),
}

impl BlockKind {
    pub fn from_type(block_type: &str) -> BlockKind {
        match block_type {
            "Inport" => BlockKind::Inport,
            "Outport" => BlockKind::Outport,
            "Constant" => BlockKind::Constant,
            "Gain" => BlockKind::Gain,
            "Sum" => BlockKind::Sum,
            "Product" => BlockKind::Product,
            "Saturate" => BlockKind::Saturate,
            "MinMax" => BlockKind::MinMax,
            "Abs" => BlockKind::Abs,
            "RelationalOperator" => BlockKind::RelationalOperator,
            "Logic" => BlockKind::Logic,
            "Switch" => BlockKind::Switch,
            "Trigonometry" => BlockKind::Trigonometry,
            "Math" => BlockKind::Math,
            "UnitDelay" => BlockKind::UnitDelay,
            "Memory" => BlockKind::Memory,
            "Integrator" => BlockKind::Integrator,
            "DiscreteIntegrator" => BlockKind::DiscreteIntegrator,
            "TransferFcn" => BlockKind::TransferFcn,
            "SubSystem" => BlockKind::SubSystem,
            "Demux" => BlockKind::Demux,
            "Mux" => BlockKind::Mux,
            other => BlockKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BlockKind::Inport => "Inport",
            BlockKind::Outport => "Outport",
            BlockKind::Constant => "Constant",
            BlockKind::Gain => "Gain",
            BlockKind::Sum => "Sum",
            BlockKind::Product => "Product",
            BlockKind::Saturate => "Saturate",
            BlockKind::MinMax => "MinMax",
            BlockKind::Abs => "Abs",
            BlockKind::RelationalOperator => "RelationalOperator",
            BlockKind::Logic => "Logic",
            BlockKind::Switch => "Switch",
            BlockKind::Trigonometry => "Trigonometry",
            BlockKind::Math => "Math",
            BlockKind::UnitDelay => "UnitDelay",
            BlockKind::Memory => "Memory",
            BlockKind::Integrator => "Integrator",
            BlockKind::DiscreteIntegrator => "DiscreteIntegrator",
            BlockKind::TransferFcn => "TransferFcn",
            BlockKind::SubSystem => "SubSystem",
            BlockKind::Demux => "Demux",
            BlockKind::Mux => "Mux",
            BlockKind::Unknown(s) => s.as_str(),
        }
    }

    /// Stateful blocks output prior state in the current tick, so they
    /// act as sources for scheduling and break feedback loops.
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            BlockKind::UnitDelay
                | BlockKind::Memory
                | BlockKind::Integrator
                | BlockKind::DiscreteIntegrator
        )
    }
}

/// Is the raw type string one of the stateful kinds.
pub fn is_stateful_type(block_type: &str) -> bool {
    BlockKind::from_type(block_type).is_stateful()
}

/// Map a display name to an identifier usable in generated code:
/// non-alphanumeric characters become `_` and a leading digit gets a
/// `_` prefix. Idempotent.
pub fn sanitize(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            result.push(c);
        } else {
            result.push('_');
        }
    }
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}
