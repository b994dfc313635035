// used to print out readable forms of an expression
use std::fmt;
// used when parsing a function name
use std::str::FromStr;

use crate::error::{Result, XtdbError};

// ------------- Expression -------------
/// An opaque piece of query text, usable wherever a projection or a
/// clause fragment is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expression {
    text: String,
}
impl Expression {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn compile(&self) -> String {
        self.text.clone()
    }
}
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
impl From<&str> for Expression {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}
impl From<String> for Expression {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

// ------------- Aggregate -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Sum,
    Min,
    Max,
    Count,
    CountDistinct,
    Avg,
    Median,
    Variance,
    Stddev,
    Distinct,
    Rand,
    Sample,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 12] = [
        Self::Sum,
        Self::Min,
        Self::Max,
        Self::Count,
        Self::CountDistinct,
        Self::Avg,
        Self::Median,
        Self::Variance,
        Self::Stddev,
        Self::Distinct,
        Self::Rand,
        Self::Sample,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::CountDistinct => "count-distinct",
            Self::Avg => "avg",
            Self::Median => "median",
            Self::Variance => "variance",
            Self::Stddev => "stddev",
            Self::Distinct => "distinct",
            Self::Rand => "rand",
            Self::Sample => "sample",
        }
    }
    /// Number of extra arguments (the `N` of `rand` and `sample`).
    pub fn arity(&self) -> usize {
        match self {
            Self::Rand | Self::Sample => 1,
            _ => 0,
        }
    }
}
impl FromStr for AggregateFunction {
    type Err = XtdbError;
    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|function| function.name() == name)
            .ok_or_else(|| XtdbError::InvalidAggregateFunction(name.to_string()))
    }
}
impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An aggregate call such as `(sum ?price)` or `(sample 12 ?name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aggregate {
    function: AggregateFunction,
    operand: String,
    args: Vec<u64>,
}

impl Aggregate {
    /// Looks the function up by name and checks the number of extra arguments.
    pub fn create(function: &str, operand: impl Into<String>, args: &[u64]) -> Result<Self> {
        Self::new(function.parse()?, operand, args)
    }
    pub fn new(function: AggregateFunction, operand: impl Into<String>, args: &[u64]) -> Result<Self> {
        if args.len() != function.arity() {
            return Err(XtdbError::InvalidAggregateArity {
                function: function.name().to_string(),
                expected: function.arity(),
                given: args.len(),
            });
        }
        Ok(Self {
            function,
            operand: operand.into(),
            args: args.to_vec(),
        })
    }
    fn unary(function: AggregateFunction, operand: impl fmt::Display) -> Self {
        Self {
            function,
            operand: operand.to_string(),
            args: Vec::new(),
        }
    }
    fn sized(function: AggregateFunction, operand: impl fmt::Display, n: u64) -> Self {
        Self {
            function,
            operand: operand.to_string(),
            args: vec![n],
        }
    }

    pub fn sum(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Sum, operand)
    }
    pub fn min(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Min, operand)
    }
    pub fn max(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Max, operand)
    }
    pub fn count(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Count, operand)
    }
    pub fn count_distinct(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::CountDistinct, operand)
    }
    pub fn avg(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Avg, operand)
    }
    pub fn median(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Median, operand)
    }
    pub fn variance(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Variance, operand)
    }
    pub fn stddev(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Stddev, operand)
    }
    pub fn distinct(operand: impl fmt::Display) -> Self {
        Self::unary(AggregateFunction::Distinct, operand)
    }
    pub fn rand(operand: impl fmt::Display, n: u64) -> Self {
        Self::sized(AggregateFunction::Rand, operand, n)
    }
    pub fn sample(operand: impl fmt::Display, n: u64) -> Self {
        Self::sized(AggregateFunction::Sample, operand, n)
    }

    pub fn function(&self) -> AggregateFunction {
        self.function
    }
    pub fn operand(&self) -> &str {
        &self.operand
    }
    pub fn args(&self) -> &[u64] {
        &self.args
    }
    /// `(function operand)` or, with an extra argument, `(function N operand)`.
    pub fn compile(&self) -> String {
        match self.args.first() {
            Some(n) => format!("({} {} {})", self.function, n, self.operand),
            None => format!("({} {})", self.function, self.operand),
        }
    }
}
impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.compile())
    }
}
impl From<Aggregate> for Expression {
    fn from(aggregate: Aggregate) -> Self {
        Expression::new(aggregate.compile())
    }
}
impl From<&Aggregate> for Expression {
    fn from(aggregate: &Aggregate) -> Self {
        Expression::new(aggregate.compile())
    }
}
