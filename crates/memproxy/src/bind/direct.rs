//! The standard libc names, overriding the default provider through
//! load-time symbol precedence (`LD_PRELOAD` or link order).

super::export_allocator_api!(crate::bind::DIRECT, "");
