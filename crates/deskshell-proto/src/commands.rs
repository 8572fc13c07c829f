//! Command names recognised by the backend registry.

pub const GREET: &str = "greet";
pub const LOG_FRONTEND_MESSAGE: &str = "log_frontend_message";
pub const OPEN_LOG_FOLDER: &str = "open_log_folder";
pub const CHECK_DB_HEALTH: &str = "check_db_health";
pub const GET_APP_SETTING: &str = "get_app_setting";
pub const SET_APP_SETTING: &str = "set_app_setting";
pub const GET_ALL_SETTINGS: &str = "get_all_settings";
pub const CREATE_USER: &str = "create_user";
pub const LIST_USERS: &str = "list_users";
pub const DELETE_USER: &str = "delete_user";
pub const HTTP_REQUEST: &str = "http_request";

pub const ALL: [&str; 11] = [
    GREET,
    LOG_FRONTEND_MESSAGE,
    OPEN_LOG_FOLDER,
    CHECK_DB_HEALTH,
    GET_APP_SETTING,
    SET_APP_SETTING,
    GET_ALL_SETTINGS,
    CREATE_USER,
    LIST_USERS,
    DELETE_USER,
    HTTP_REQUEST,
];
