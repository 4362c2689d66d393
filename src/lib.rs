//! Exchange Broker - negotiation engine for reciprocal engagement exchanges
//!
//! Contacts discovered in chat groups offer to trade engagement on each
//! other's videos. The broker tracks each contact's reliability, drives the
//! per-contact negotiation through agreement, execution and verification,
//! leases automation profiles within their daily quotas, and times out
//! negotiations that stall.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
