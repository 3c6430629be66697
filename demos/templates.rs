#[macro_use]
extern crate log;

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use contextual::{helpers, prelude::*, template::Jinja};
use hyper::{server::conn::AddrStream, service::make_service_fn, Server};

// == templates == //

fn pages() -> Result<Jinja, ContextualError> {
    let mut pages = Jinja::new();
    pages.add("index.html", "<h1>{{ name }}</h1>\n<p>signed in as {{ user }}</p>\n")?;
    pages.add("about.html", "<p>contextual demo, served to {{ agent }}</p>\n")?;
    Ok(pages)
}

// == middleware == //

fn log_requests(next: ContextFunc) -> ContextFunc {
    ContextFunc::new(move |c: Context| {
        let (_, r) = unbind(&c);
        info!("{} {} from {:?}", r.method(), r.uri(), r.peer_addr());
        next.call(c)
    })
}

fn with_user(next: ContextFunc) -> ContextFunc {
    ContextFunc::new(move |c: Context| {
        let user = helpers::cookie(&c, "user").map(|cookie| cookie.value().to_string()).unwrap_or_else(|_| "guest".to_string());
        template::set(&c, "user", user.clone());
        next.call(c.with_value("user", user))
    })
}

// == handlers == //

fn app(pages: Arc<Jinja>) -> ContextFunc {
    ContextFunc::new(move |c: Context| {
        let pages = pages.clone();
        async move {
            let templates = &*pages;
            let (_, r) = unbind(&c);

            match r.uri().path() {
                "/" => {
                    template::set(&c, "name", "Bob Jones");
                    let result = if helpers::form_value(&c, "format").await.as_deref() == Some("json") {
                        template::render_json(&c)
                    } else {
                        template::render(&c, templates, "index.html")
                    };
                    if let Err(e) = result {
                        warn!("unable to render index: {}", e);
                    }
                }
                "/about" => {
                    template::set(&c, "agent", helpers::user_agent(&c).unwrap_or_default());
                    if let Err(e) = template::render(&c, templates, "about.html") {
                        warn!("unable to render about: {}", e);
                    }
                }
                "/login" => {
                    let name = helpers::form_value(&c, "name").await.unwrap_or_else(|| "fred".to_string());
                    helpers::set_cookie(&c, &Cookie::build(("user", name)).path("/").build());
                    helpers::redirect(&c, "/", StatusCode::SEE_OTHER);
                }
                "/source" => helpers::serve_file(&c, file!()).await,
                _ => helpers::not_found(&c),
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let pages = Arc::new(pages()?);
    let chain = log_requests(with_user(app(pages)));

    let service = HandlerService::builder().server_name("contextual-demo").build(to_handler(chain))?;
    let make = make_service_fn(move |conn: &AddrStream| {
        let service = service.with_peer_addr(conn.remote_addr());
        async move { Ok::<_, Infallible>(service) }
    });

    let addr: SocketAddr = ([127, 0, 0, 1], 3000).into();
    info!("listening on http://{}", addr);
    Server::bind(&addr).serve(make).await?;
    Ok(())
}
