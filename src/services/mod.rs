/*
 * Responsibility
 * - ドメインロジック (署名・鍵管理・token・UMA) の置き場
 * - HTTP には依存しない
 */
pub mod clients;
pub mod crypto;
pub mod keys;
pub mod token;
pub mod uma;
