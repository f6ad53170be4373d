
// Only the Rigol DG1022 is supported.  Drivers borrow a Session rather than owning a link.

pub mod dg1022;
