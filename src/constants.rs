pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const SUBSCRIPTION_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MAX_COOKING_TIME: i32 = 32000;

pub const MIN_INGREDIENT_AMOUNT: i32 = 1;
pub const MAX_INGREDIENT_AMOUNT: i32 = 32000;

pub const MAX_RECIPE_NAME_LENGTH: usize = 256;

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.csv";
pub const SHOPPING_LIST_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
pub const SHOPPING_LIST_HEADER: (&str, &str) = ("Ингредиент", "Количество");

pub const RECIPE_IMAGE_DIR: &str = "recipes/images";
pub const AVATAR_IMAGE_DIR: &str = "users";

pub const IMAGE_FORMATS: &[(&str, &str)] = &[
    ("png", "png"),
    ("jpeg", "jpg"),
    ("jpg", "jpg"),
    ("gif", "gif"),
    ("webp", "webp"),
];

pub const SESSION_COOKIE: &str = "session";
