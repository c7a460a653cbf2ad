//! エラーメッセージ定数

/// エージェント開始前に実行スレッド専用操作が呼ばれた場合のエラーメッセージ
pub const ERR_NOT_STARTED: &str = "Inspector agent is not started";

/// 既にフロントエンドが接続されている場合のエラーメッセージ
pub const ERR_ALREADY_CONNECTED: &str = "A frontend session is already connected";

/// フロントエンド未接続で dispatch された場合のエラーメッセージ
pub const ERR_NO_CHANNEL: &str = "No frontend session is connected";

/// フロントエンド未接続で一時停止ループに入った場合のエラーメッセージ
pub const ERR_PAUSE_WITHOUT_CHANNEL: &str = "Paused without a connected frontend session";
