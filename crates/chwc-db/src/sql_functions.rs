use diesel::sql_types::Text;

diesel::define_sql_function! {
    /// Postgres `lower(text)`, used for case-insensitive logon name matching.
    fn lower(x: Text) -> Text;
}
