#![allow(unused_imports)]

pub use std::collections::{HashMap, HashSet};
pub use std::sync::Arc;

pub use anyhow::{Context, anyhow, bail};
pub use async_trait::async_trait;
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};
pub use uuid::Uuid;

pub use log::{debug, error, info, trace, warn};

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::validation_bail;
pub use crate::api_bail;
