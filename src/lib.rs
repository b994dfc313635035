//! xtdb-client – a Datalog query compiler and transaction client for XTDB.
//!
//! Queries are built as trees of [`datalog::Clause`]s and compiled to the
//! EDN query text the database node accepts over HTTP, such as
//! `{:query {:find [(pull City [*])] :where [ [ City :City/name "Paris" ] [ City :type "City" ]]}}`.
//!
//! Clause trees are values: combinators consume their operands and return
//! a new tree or an error, never a coerced result. Equal trees compile to
//! the same text, since `and`/`or` siblings are deduplicated and sorted.
//!
//! ## Modules
//! * [`datalog`] – The clause algebra (`Where`, `And`, `Or`, `Not`, joins...) and
//!   the [`datalog::Combine`] combinators.
//! * [`expression`] – Opaque expressions and aggregate calls (`(sum ?x)`, `(sample 12 ?x)`).
//! * [`keys`] – Query keys (`:in`, `:order-by`, `:limit`, `:offset`, `:timeout`) and
//!   the terminal [`keys::FindWhere`].
//! * [`orm`] – Static entity type descriptors, documents and the [`orm::Entity`] trait.
//! * [`query`] – The typed [`query::Query`] builder, validated against entity types.
//! * [`session`] – Transactions, the HTTP [`session::XtdbClient`] and the buffering
//!   [`session::XtdbSession`].
//! * [`settings`] – Client settings read from `xtdb.toml` and `XTDB_*` variables.
//!
//! ## Quick Start
//! ```
//! use xtdb_client::datalog::{Combine, Find, Where};
//!
//! let filter = Where::new("a", "b", "c").and_(Where::new("1", "2", "3")).unwrap();
//! assert_eq!(filter.to_string(), ":where [ [ 1 :2 3 ] [ a :b c ]]");
//!
//! let query = Find::new("a").and_(Where::new("a", "b", "c")).unwrap();
//! assert_eq!(query.to_string(), "{:query {:find [a] :where [[ a :b c ]]}}");
//! ```
//!
//! Sending a query needs a running node:
//! ```no_run
//! # async fn run() -> xtdb_client::Result<()> {
//! use xtdb_client::session::{TimeParams, XtdbClient};
//!
//! let client = XtdbClient::new("http://localhost:3000/_xtdb")?;
//! let rows = client
//!     .query("{:query {:find [e] :where [[ e :xt/id _ ]]}}", &TimeParams::default())
//!     .await?;
//! println!("{rows}");
//! # Ok(())
//! # }
//! ```

pub mod datalog;
pub mod error;
pub mod expression;
pub mod keys;
pub mod orm;
pub mod query;
pub mod session;
pub mod settings;

pub use error::{Result, XtdbError};
