use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies, all sharing one in-memory group database.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `GroupStore`, `MemoryGroupDb`, `SubscriptionHub`, and `RecordedQueries`
/// (the queries the stub search provider has received).
///
/// The server searches a stub provider returning businesses `a1` and `b1`.
/// `#[backend_test(failing_search)]` makes every search fail instead, and
/// `#[backend_test(empty_search)]` makes every search come back empty.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract injected parameters and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Pick the search behaviour.
    let search = match parse_macro_input!(args as Option<Ident>) {
        None => quote! { example },
        Some(arg) if arg == "failing_search" => quote! { failing },
        Some(arg) if arg == "empty_search" => quote! { empty },
        Some(arg) => {
            return syn::Error::new(
                arg.span(),
                "Expected `failing_search`, `empty_search` or nothing",
            )
            .into_compile_error()
            .into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::model::group::GroupStore,
                crate::model::db::MemoryGroupDb,
                crate::model::search::stub::RecordedQueries,
            ) {
                let db = crate::model::db::MemoryGroupDb::new();
                let store = crate::model::group::GroupStore::new(std::sync::Arc::new(db.clone()));
                let stub = crate::model::search::stub::StubSearch::#search();
                let queries = stub.queries();
                let search = crate::model::search::BusinessSearch::new(stub);
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_store_and_search(store.clone(), search),
                )
                .await
                .unwrap();
                (rocket_client, store, db, queries)
            }

            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(["picky_backend"], None, None);

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, store, db, queries) = setup().await;
                #[allow(unused_variables)]
                let hub = rocket_client
                    .rocket()
                    .state::<crate::model::subscription::SubscriptionHub>()
                    .unwrap()
                    .clone();

                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, map its parameters to injected values,
/// and reject unknown or repeated parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen: Vec<String> = vec![];
    let mut args = vec![];

    for input in &sig.inputs {
        let type_ident = match input {
            FnArg::Typed(pat_type) => match &*pat_type.ty {
                Type::Path(type_path) => type_path.path.segments.last().map(|s| &s.ident),
                _ => None,
            },
            FnArg::Receiver(_) => None,
        };
        let Some(type_ident) = type_ident else {
            return Err(unexpected(input));
        };

        let arg = if type_ident == "Client" {
            quote! { rocket_client }
        } else if type_ident == "GroupStore" {
            quote! { store.clone() }
        } else if type_ident == "MemoryGroupDb" {
            quote! { db.clone() }
        } else if type_ident == "SubscriptionHub" {
            quote! { hub.clone() }
        } else if type_ident == "RecordedQueries" {
            quote! { queries.clone() }
        } else {
            return Err(unexpected(input));
        };

        let type_name = type_ident.to_string();
        if seen.contains(&type_name) {
            return Err(syn::Error::new(
                input.span(),
                format!("Test cannot accept more than one `{type_name}`"),
            ));
        }
        seen.push(type_name);
        args.push(arg);
    }

    Ok(args)
}

fn unexpected(input: &FnArg) -> syn::Error {
    syn::Error::new(
        input.span(),
        "Expected parameters of type `Client`, `GroupStore`, `MemoryGroupDb`, `SubscriptionHub` or `RecordedQueries`",
    )
}
