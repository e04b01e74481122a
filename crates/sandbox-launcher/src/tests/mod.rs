//! Pipeline and behavioural tests for the launcher.

mod support;
