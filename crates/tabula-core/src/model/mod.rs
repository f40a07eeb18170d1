//! Runtime mapping model.
//!
//! Types in `model` are the boot-time descriptors the coordinators consume:
//! which tables an entity spans, which columns each attribute writes, how
//! attributes are versioned and generated, and how a collection role maps its
//! rows. They are produced by the metadata layer through the builders here and
//! never change after construction.
//!
//! In general:
//! - the metadata layer defines *what exists*
//! - `model` defines *what the coordinators see*

pub mod attribute;
pub mod collection;
pub mod entity;
pub mod table;
