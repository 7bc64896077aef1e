mod comments;
mod profiles;
