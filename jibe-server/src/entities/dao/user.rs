/// The parts of a `users` row the API acts on.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub points: i64,
}
