pub mod db_utils;
pub mod email_filter;
pub mod user_cache;
