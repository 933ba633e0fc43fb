//! The request and response of the execution step: a GraphQL request in,
//! a [`ResponseBody`] out.

use static_assertions::assert_impl_all;
use tower::BoxError;

use super::ResponseBody;
use crate::Context;
use crate::graphql;

pub type ServiceResult = Result<Response, BoxError>;

assert_impl_all!(Request: Send);
#[non_exhaustive]
pub struct Request {
    /// The GraphQL request to execute, with its input configurers.
    pub graphql_request: graphql::Request,

    pub context: Context,
}

#[buildstructor::buildstructor]
impl Request {
    /// This is the constructor (or builder) to use when constructing a real execution Request.
    #[builder(visibility = "pub")]
    fn new(graphql_request: graphql::Request, context: Option<Context>) -> Request {
        Self {
            graphql_request,
            context: context.unwrap_or_default(),
        }
    }
}

assert_impl_all!(Response: Send);
#[non_exhaustive]
#[derive(Debug)]
pub struct Response {
    pub body: ResponseBody,

    pub context: Context,
}

impl Response {
    pub fn new(body: ResponseBody, context: Context) -> Response {
        Self { body, context }
    }
}
