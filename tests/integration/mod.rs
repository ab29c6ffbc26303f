//! End-to-end runs of the built-in presets against realistic fixtures.

mod reviews_autosave;
