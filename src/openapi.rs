use crate::models::{NewNews, News, NewUser, UpdateNews, User};
use crate::upload::UploadedFile;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::news_index,
        crate::routes::news_show,
        crate::routes::news_store,
        crate::routes::news_destroy,
        crate::routes::news_restore,
        crate::routes::upload_file,
        crate::routes::upload_and_save,
        crate::routes::image_show,
    ),
    components(schemas(
        News, NewNews, UpdateNews, User, NewUser, UploadedFile,
        crate::routes::LoginRequest, crate::routes::RegisterRequest,
        crate::routes::StoreNewsRequest,
        crate::routes::Base64UploadRequest, crate::routes::Base64SaveRequest,
    )),
    tags(
        (name = "news", description = "News lifecycle operations"),
        (name = "uploads", description = "Image upload operations"),
        (name = "images", description = "Image proxy"),
    )
)]
pub struct ApiDoc;
