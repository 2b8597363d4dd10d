#![forbid(unsafe_code)]

//! Rust client for the Copernicus Climate Data Store (CDS) API.
//!
//! This crate is a Rust re-implementation of the core ideas from the upstream
//! `cdsapi` Python package: you express a retrieval request (keyword/value
//! pairs), the request is submitted to a dataset endpoint, the server-side
//! task is polled until it completes, and the packaged result is downloaded
//! to a local file.
//!
//! **Quick start**
//! ```no_run
//! use cds_api::{Client, ClientOptions, Request};
//!
//! let opts = ClientOptions {
//!     // Python: cdsapi.Client(key="uid:secret", retry_max=5, progress=True)
//!     key: Some("uid:secret".to_string()),
//!     retry_max: 5,
//!     progress: true,
//!     ..ClientOptions::default()
//! };
//! let client = Client::new(opts)?;
//!
//! // Builder style
//! let req = Request::new()
//!     .product_type("ensemble_mean")
//!     .variable(["relative_humidity", "wind_speed"])
//!     .grid_resolution("0.1deg")
//!     .period("2011_2023")
//!     .version("28.0e")
//!     .format("tgz");
//! let result = client.retrieve("insitu-gridded-observations-europe", &req, "download.tar.gz")?;
//! println!("{} bytes", result.size_bytes);
//! # Ok::<(), cds_api::Error>(())
//! ```
//!
//! Without an explicit key, credentials are resolved from the `CDSAPI_URL` /
//! `CDSAPI_KEY` environment variables or `~/.cdsapirc`, as the Python client
//! does.
//!
//! Notes:
//! - Requests are passed through verbatim; field validation happens
//!   service-side, so schema errors come back as failed tasks.
//! - Downloads are governed by the licence terms of the dataset requested.

mod client;
mod config;
mod error;
mod request;
mod status;

pub use crate::client::{Client, ClientOptions, RetrieveResult};
pub use crate::config::{Credentials, DEFAULT_URL};
pub use crate::error::{Error, Result};
pub use crate::request::{Request, RequestValue};
pub use crate::status::{Reply, TaskError, TaskState};
