//! Integration tests driving full harvest runs against mock HTTP servers

mod harvest_tests;
