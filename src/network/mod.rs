/*
 * This module defines the structured diagnostic data the application works with:
 * traceroute hops and their timeout classification, executed commands and their results,
 * and the history of past runs.
 */

pub mod command;
pub mod history;
pub mod hop;
pub mod trace_text;
