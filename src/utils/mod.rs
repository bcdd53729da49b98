pub mod slow_warn;
