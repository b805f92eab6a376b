use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::*;
use structopt::StructOpt;

use resthttp::auth::bearer_token;
use resthttp::prelude::*;
use resthttp::server::TcpServer;

#[derive(Debug, StructOpt)]
#[structopt(name = "rest_service", about = "Example REST service.")]
struct Opt {
    #[structopt(short, long, default_value = "8080")]
    port: u16,
    #[structopt(long, default_value = "4")]
    threads: usize,
    #[structopt(long, default_value = "10")]
    timeout: u64,
    /// Bearer token required for DELETE
    #[structopt(long, default_value = "s3cr3t")]
    token: String,
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
struct Person {
    #[serde(default)]
    id: u64,
    name: String,
    age: u16,
}

#[derive(Default)]
struct People {
    next_id: AtomicU64,
    people: Mutex<BTreeMap<u64, Person>>,
}

impl People {
    fn insert(&self, mut person: Person) -> Result<Person, HttpError> {
        person.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock()?.insert(person.id, person.clone());
        Ok(person)
    }
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<u64, Person>>, HttpError> {
        self.people
            .lock()
            .map_err(|_| HttpError::internal("person table is poisoned"))
    }
}

fn person_id(ctx: &Context<'_>) -> Result<u64, HttpError> {
    ctx.param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HttpError::bad_request("id must be a number"))
}

fn api(people: Arc<People>, token: &str) -> Routes {
    let mut routes = Routes::new();

    let store = people.clone();
    routes.route("/person").get(move |ctx| {
        let all: Vec<Person> = store.lock()?.values().cloned().collect();
        ctx.set_json(serde_json::to_value(all)?);
        Ok(())
    });

    let store = people.clone();
    routes.route("/person").post(move |ctx| {
        let person: Person = serde_json::from_value(ctx.json_in.take())?;
        let person = store.insert(person)?;
        info!("created {:?}", person);
        ctx.response.set_status(201);
        ctx.set_json(serde_json::to_value(person)?);
        Ok(())
    });

    let store = people.clone();
    routes.route("/person/:id").get(move |ctx| {
        let id = person_id(ctx)?;
        match store.lock()?.get(&id) {
            Some(person) => ctx.set_json(serde_json::to_value(person)?),
            None => return Err(HttpError::not_found(&format!("no person with id {}", id))),
        }
        Ok(())
    });

    let store = people;
    let delete = move |ctx: &mut Context<'_>| -> HandlerResult {
        let id = person_id(ctx)?;
        match store.lock()?.remove(&id) {
            Some(_) => {
                ctx.response.set_status(204);
                Ok(())
            }
            None => Err(HttpError::not_found(&format!("no person with id {}", id))),
        }
    };
    routes.add_route(Route::new(
        Some(Method::DELETE),
        "/person/:id",
        delete.authenticated(bearer_token(token)),
    ));

    routes
        .route("/stats")
        .get(|ctx| {
            let stats = ctx.routes().statistics();
            ctx.set_json(stats);
            Ok(())
        });

    routes.add_redirect("^/people$", "/person").unwrap();
    routes
}

fn main() {
    let opt = Opt::from_args();

    stderrlog::new()
        .module(module_path!())
        .module("resthttp")
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Millisecond)
        .init()
        .unwrap();

    let options = ServerOptions::default()
        .with_threads(opt.threads)
        .with_timeout_secs(opt.timeout)
        .with_timer_header("X-Handler-Microseconds");
    let routes = api(Arc::new(People::default()), &opt.token);
    let mut server = TcpServer::new(&format!("0.0.0.0:{}", opt.port), routes, options).unwrap();
    println!("Serving people, check out: http://localhost:{}/person", opt.port);
    server.serve_forever();
}
