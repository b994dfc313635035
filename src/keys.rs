//! Query keys (`:in`, `:order-by`, `:limit`, `:offset`, `:timeout`) and the
//! terminal [`FindWhere`] that assembles a complete query.

// used when parsing a sort direction
use std::str::FromStr;
use std::fmt;

use crate::datalog::{quote, Clause, Kind};
use crate::error::{Result, XtdbError};

const COLLECTION_MARKER: &str = "...";

// ------------- In -------------
/// The binding shape of the `:in` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InArgs {
    /// `:in [name]`
    Scalar(String),
    /// `:in [[a b]]` binds a tuple, `:in [[a ...]]` binds a collection.
    Sequence(Vec<String>),
    /// `:in [[[a b] ...]]` binds a relation.
    Relation(Vec<String>),
}

/// The values bound to the `:in` arguments, shaped like the arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InValues {
    Scalar(String),
    Sequence(Vec<String>),
    Relation(Vec<Vec<String>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct In {
    args: InArgs,
    values: InValues,
}

impl In {
    pub fn new(args: InArgs, values: InValues) -> Result<Self> {
        match (&args, &values) {
            (InArgs::Scalar(name), InValues::Scalar(_)) => {
                if name.is_empty() {
                    return Err(XtdbError::InvalidInArguments("empty argument name".to_string()));
                }
            }
            (InArgs::Sequence(names), InValues::Sequence(values)) => {
                check_names(names, true)?;
                let collection = names.last().is_some_and(|name| name == COLLECTION_MARKER);
                if !collection && names.len() != values.len() {
                    return Err(XtdbError::InvalidInArguments(format!(
                        "tuple of {} arguments bound to {} values",
                        names.len(),
                        values.len()
                    )));
                }
            }
            (InArgs::Relation(names), InValues::Relation(rows)) => {
                check_names(names, false)?;
                if let Some(row) = rows.iter().find(|row| row.len() != names.len()) {
                    return Err(XtdbError::InvalidInArguments(format!(
                        "relation of {} arguments bound to a row of {} values",
                        names.len(),
                        row.len()
                    )));
                }
            }
            _ => {
                return Err(XtdbError::InvalidInArguments(
                    "the shape of the values does not match the arguments".to_string(),
                ));
            }
        }
        Ok(Self { args, values })
    }
    pub fn scalar(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(InArgs::Scalar(name.into()), InValues::Scalar(value.into()))
    }
    /// Binds `name` to every value of `values` (`:in [[name ...]]`).
    pub fn collection<I, S>(name: impl Into<String>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            InArgs::Sequence(vec![name.into(), COLLECTION_MARKER.to_string()]),
            InValues::Sequence(values.into_iter().map(Into::into).collect()),
        )
    }
    pub fn args(&self) -> &InArgs {
        &self.args
    }
    pub fn values(&self) -> &InValues {
        &self.values
    }
    pub fn compile(&self, root: bool) -> String {
        let binding = match &self.args {
            InArgs::Scalar(name) => name.clone(),
            InArgs::Sequence(names) => format!("[{}]", names.join(" ")),
            InArgs::Relation(names) => format!("[[{}] {}]", names.join(" "), COLLECTION_MARKER),
        };
        if root {
            format!(":in [{binding}]")
        } else {
            binding
        }
    }
    /// The `:in-args [...]` payload sent next to the query.
    pub fn compile_values(&self) -> String {
        let values = match &self.values {
            InValues::Scalar(value) => quote(value),
            InValues::Sequence(values) => quoted_list(values),
            InValues::Relation(rows) => {
                let rows: Vec<String> = rows.iter().map(|row| quoted_list(row)).collect();
                format!("[{}]", rows.join(" "))
            }
        };
        format!(":in-args [{values}]")
    }
}

fn check_names(names: &[String], collection_allowed: bool) -> Result<()> {
    if names.is_empty() {
        return Err(XtdbError::InvalidInArguments("no arguments given".to_string()));
    }
    for (position, name) in names.iter().enumerate() {
        if name.is_empty() {
            return Err(XtdbError::InvalidInArguments("empty argument name".to_string()));
        }
        if name == COLLECTION_MARKER {
            // only as the tail of a one-name collection binding
            if !collection_allowed || position != 1 || names.len() != 2 {
                return Err(XtdbError::InvalidInArguments(format!(
                    "misplaced {COLLECTION_MARKER} in {}",
                    names.join(" ")
                )));
            }
        }
    }
    Ok(())
}

fn quoted_list(values: &[String]) -> String {
    let values: Vec<String> = values.iter().map(|value| quote(value)).collect();
    format!("[{}]", values.join(" "))
}

// ------------- OrderBy -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}
impl Direction {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}
impl FromStr for Direction {
    type Err = XtdbError;
    fn from_str(direction: &str) -> Result<Self> {
        match direction {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(XtdbError::InvalidSortDirection(other.to_string())),
        }
    }
}
impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    fields: Vec<(String, Direction)>,
}
impl OrderBy {
    /// Directions are given as text and must be exactly `asc` or `desc`.
    pub fn new<I, F, D>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (F, D)>,
        F: Into<String>,
        D: AsRef<str>,
    {
        let fields = fields
            .into_iter()
            .map(|(field, direction)| Ok((field.into(), direction.as_ref().parse()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }
    pub fn by(fields: Vec<(String, Direction)>) -> Self {
        Self { fields }
    }
    pub fn fields(&self) -> &[(String, Direction)] {
        &self.fields
    }
    pub fn compile(&self, root: bool) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(field, direction)| format!("[{field} :{direction}]"))
            .collect();
        let fields = format!("[{}]", fields.join(" "));
        if root {
            format!(":order-by {fields}")
        } else {
            fields
        }
    }
}

// ------------- Limit / Offset / Timeout -------------
macro_rules! single_value_key {
    ($name:ident, $keyword:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);
        impl $name {
            pub fn value(&self) -> u64 {
                self.0
            }
            pub fn compile(&self, root: bool) -> String {
                if root {
                    format!(concat!(":", $keyword, " {}"), self.0)
                } else {
                    self.0.to_string()
                }
            }
        }
    };
}
single_value_key!(Limit, "limit");
single_value_key!(Offset, "offset");
// milliseconds, enforced by the database node
single_value_key!(Timeout, "timeout");

// ------------- FindWhere -------------
/// A complete query: a projection, a filter and the optional keys.
#[derive(Debug, Clone)]
pub struct FindWhere {
    find: Clause,
    filter: Clause,
    in_: Option<In>,
    order_by: Option<OrderBy>,
    limit: Option<Limit>,
    offset: Option<Offset>,
    timeout: Option<Timeout>,
}

impl FindWhere {
    /// Fails unless `find` is a projection and `filter` a where clause.
    pub fn new(find: Clause, filter: Clause) -> Result<Self> {
        if find.kind() != Kind::Find || filter.kind() != Kind::Where {
            return Err(XtdbError::IncompatibleSection {
                left: find.name().to_string(),
                right: filter.name().to_string(),
            });
        }
        Ok(Self::assemble(find, filter))
    }
    pub(crate) fn assemble(find: Clause, filter: Clause) -> Self {
        Self {
            find,
            filter,
            in_: None,
            order_by: None,
            limit: None,
            offset: None,
            timeout: None,
        }
    }
    pub fn find(&self) -> &Clause {
        &self.find
    }
    pub fn filter(&self) -> &Clause {
        &self.filter
    }
    pub fn in_args(&self) -> Option<&In> {
        self.in_.as_ref()
    }
    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }
    pub fn limit(&self) -> Option<Limit> {
        self.limit
    }
    pub fn offset(&self) -> Option<Offset> {
        self.offset
    }
    pub fn timeout(&self) -> Option<Timeout> {
        self.timeout
    }

    pub fn with_in(mut self, in_: In) -> Self {
        self.in_ = Some(in_);
        self
    }
    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }
    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }
    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets one query key; anything but a key is refused.
    pub fn set_key(&mut self, key: Clause) -> Result<()> {
        match key {
            Clause::In(key) => self.in_ = Some(key),
            Clause::OrderBy(key) => self.order_by = Some(key),
            Clause::Limit(key) => self.limit = Some(key),
            Clause::Offset(key) => self.offset = Some(key),
            Clause::Timeout(key) => self.timeout = Some(key),
            other => {
                return Err(XtdbError::UnsupportedCombination(format!(
                    "cannot use & on find-where and {}",
                    other.name()
                )));
            }
        }
        Ok(())
    }

    pub fn compile(&self, separator: &str) -> String {
        let mut query = format!(
            "{{:query {{{} {}",
            self.find.compile(true, " "),
            self.filter.compile(true, separator)
        );
        let keys = [
            self.in_.as_ref().map(|key| key.compile(true)),
            self.order_by.as_ref().map(|key| key.compile(true)),
            self.limit.map(|key| key.compile(true)),
            self.offset.map(|key| key.compile(true)),
            self.timeout.map(|key| key.compile(true)),
        ];
        for key in keys.into_iter().flatten() {
            query.push(' ');
            query.push_str(&key);
        }
        query.push('}');
        if let Some(in_) = &self.in_ {
            query.push(' ');
            query.push_str(&in_.compile_values());
        }
        query.push('}');
        query
    }
}

impl fmt::Display for FindWhere {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.compile(" "))
    }
}
