pub mod academic_year_cache;
