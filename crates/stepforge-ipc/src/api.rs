//! Contract API descriptors reported on GETAPI.

use crate::codec::Codec;
use crate::error::IpcError;
use rmpv::Value as Wire;
use stepforge_types::{ScoreError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ApiKind {
    Function = 0,
    Fallback = 1,
    Event = 2,
}

/// Method flag bits.
pub mod api_flag {
    pub const READONLY: u32 = 1;
    pub const EXTERNAL: u32 = 2;
    pub const PAYABLE: u32 = 4;
    pub const ISOLATED: u32 = 8;
}

/// Declared parameter or return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Integer,
    String,
    Bytes,
    Bool,
    Address,
    List,
    Dict,
    Struct(Vec<Field>),
    Array(Box<DataType>),
}

/// Named member of a struct parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: DataType,
}

impl DataType {
    /// Wire code; each array level adds `0x10`.
    pub fn code(&self) -> u32 {
        match self {
            DataType::Integer => 1,
            DataType::String => 2,
            DataType::Bytes => 3,
            DataType::Bool => 4,
            DataType::Address => 5,
            DataType::List => 6,
            DataType::Dict => 7,
            DataType::Struct(_) => 8,
            DataType::Array(inner) => 0x10 + inner.code(),
        }
    }

    /// Innermost element type of nested arrays.
    pub fn element(&self) -> &DataType {
        match self {
            DataType::Array(inner) => inner.element(),
            other => other,
        }
    }

    fn fields(&self) -> Option<&[Field]> {
        match self.element() {
            DataType::Struct(fields) => Some(fields),
            _ => None,
        }
    }
}

fn encode_fields(fields: &[Field]) -> Wire {
    Wire::Array(
        fields
            .iter()
            .map(|f| {
                let mut item = vec![Wire::from(f.name.as_str()), Wire::from(f.ty.code())];
                if let Some(sub) = f.ty.fields() {
                    item.push(encode_fields(sub));
                }
                Wire::Array(item)
            })
            .collect(),
    )
}

/// Declared input parameter. `default` is `Some` for optional parameters,
/// `Some(Value::Nil)` meaning "defaults to nothing".
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: DataType,
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: DataType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: DataType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default),
        }
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub kind: ApiKind,
    pub name: String,
    pub flags: u32,
    /// Mandatory input count for functions, indexed input count for events.
    pub count: usize,
    pub inputs: Vec<Param>,
    pub outputs: Vec<DataType>,
}

impl MethodDescriptor {
    pub fn is_readonly(&self) -> bool {
        self.flags & api_flag::READONLY != 0
    }

    pub fn is_external(&self) -> bool {
        self.flags & api_flag::EXTERNAL != 0
    }

    pub fn is_payable(&self) -> bool {
        self.flags & api_flag::PAYABLE != 0
    }

    pub fn is_isolated(&self) -> bool {
        self.flags & api_flag::ISOLATED != 0
    }

    fn encode(&self, codec: &Codec) -> Result<Wire, IpcError> {
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (i, p) in self.inputs.iter().enumerate() {
            let default = match (&p.default, self.kind) {
                (Some(v), ApiKind::Function) if i >= self.count => codec.encode(v)?,
                _ => Wire::Nil,
            };
            let mut item = vec![Wire::from(p.name.as_str()), Wire::from(p.ty.code()), default];
            if let Some(fields) = p.ty.fields() {
                item.push(encode_fields(fields));
            }
            inputs.push(Wire::Array(item));
        }
        Ok(Wire::Array(vec![
            Wire::from(self.kind as u32),
            Wire::from(self.name.as_str()),
            Wire::from(self.flags),
            Wire::from(self.count as u64),
            Wire::Array(inputs),
            Wire::Array(self.outputs.iter().map(|t| Wire::from(t.code())).collect()),
        ]))
    }
}

/// Static registration table of a contract's methods and events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiInfo {
    methods: Vec<MethodDescriptor>,
}

impl ApiInfo {
    /// Method name the fallback is registered and invoked under.
    pub const FALLBACK: &'static str = "fallback";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. Optional parameters must trail the mandatory ones.
    pub fn function(
        mut self,
        name: &str,
        flags: u32,
        inputs: Vec<Param>,
        outputs: Vec<DataType>,
    ) -> Result<Self, ScoreError> {
        let mandatory = inputs.iter().take_while(|p| !p.is_optional()).count();
        if inputs[mandatory..].iter().any(|p| !p.is_optional()) {
            return Err(ScoreError::IllegalFormat(format!(
                "{name}: mandatory parameter after optional one"
            )));
        }
        self.methods.push(MethodDescriptor {
            kind: ApiKind::Function,
            name: name.to_string(),
            flags,
            count: mandatory,
            inputs,
            outputs,
        });
        Ok(self)
    }

    /// Register the fallback. Only a payable, parameterless fallback is exposed.
    pub fn fallback(mut self, flags: u32, inputs: Vec<Param>) -> Self {
        if inputs.is_empty() && flags & api_flag::PAYABLE != 0 {
            self.methods.push(MethodDescriptor {
                kind: ApiKind::Fallback,
                name: Self::FALLBACK.to_string(),
                flags,
                count: 0,
                inputs: Vec::new(),
                outputs: Vec::new(),
            });
        }
        self
    }

    pub fn event(mut self, name: &str, indexed: usize, inputs: Vec<Param>) -> Result<Self, ScoreError> {
        if indexed > inputs.len() {
            return Err(ScoreError::IllegalFormat(format!(
                "{name}: indexed count {indexed} exceeds {} inputs",
                inputs.len()
            )));
        }
        self.methods.push(MethodDescriptor {
            kind: ApiKind::Event,
            name: name.to_string(),
            flags: 0,
            count: indexed,
            inputs,
            outputs: Vec::new(),
        });
        Ok(self)
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Callable method (function or fallback) by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.kind != ApiKind::Event && m.name == name)
    }

    pub fn event_by_name(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.kind == ApiKind::Event && m.name == name)
    }

    pub fn encode(&self, codec: &Codec) -> Result<Wire, IpcError> {
        self.methods
            .iter()
            .map(|m| m.encode(codec))
            .collect::<Result<Vec<_>, _>>()
            .map(Wire::Array)
    }
}
